//! ## Background
//!
//! A cost based query optimizer needs two kinds of estimates for every candidate plan: how
//! many rows each step produces and how expensive the step is. Row counts come from
//! selectivity estimation, the fraction of rows a predicate keeps, which in turn is
//! computed from statistics gathered on the stored data: null fractions, distinct counts,
//! most common values with their frequencies, histograms of the remaining values and the
//! correlation between physical and logical order. Costs come from a model of page
//! fetches and per tuple CPU work.
//!
//! Plans are searched bottom-up in the style of [1]: every base relation gets its access
//! paths, then joins of two, three and more relations are built level by level, each
//! keeping only the paths no other path beats in both cost and output ordering. Output
//! ordering matters because a path already sorted the way a merge join or the query's
//! ORDER BY needs saves an explicit sort later.
//!
//! ## Design
//!
//! ### Statistics
//!
//! Statistics are read through a per-session cache handing out guards, so every estimator
//! releases what it borrowed on all paths, early returns included. Missing statistics are
//! never an error; every estimator falls back to configured defaults.
//!
//! ### Selectivity
//!
//! Operators carry the estimators used for them: equality, inequality, range comparison
//! and pattern matching for restrictions, their counterparts for joins. Clause lists are
//! combined assuming independence, except that `<` and `>` clauses on one variable are
//! paired into a range.
//!
//! ### Path keys
//!
//! An ordering is a list of positions, each holding the expressions known to be equal at
//! that position. Join clauses add their other side to an ordering, so a join output
//! ordered on `a.x` is known to be ordered on `b.x` as well when `a.x = b.x`.
//!
//! ### Join search
//!
//! The join graph links relations sharing a join clause; cartesian products are only
//! considered when nothing else is left.
//!
//! ## Reference
//!
//! 1. Selinger, P. Griffiths, et al. "Access path selection in a relational database management
//! system." Readings in Artificial Intelligence and Databases. Morgan Kaufmann, 1989. 511-522.
//! 2. Mackert, L. F. and Lohman, G. M. "Index scans using a finite LRU buffer: a validated I/O
//! model." ACM Transactions on Database Systems 14(3), 1989. 401-424.

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod catalog;
pub mod cost;
pub mod datum;
pub mod error;
pub mod expr;
pub mod joinsearch;
pub mod operator;
pub mod optimizer;
pub mod planner;
pub mod properties;
pub mod relids;
pub mod selectivity;
pub mod stat;

#[cfg(test)]
pub(crate) mod testing;
