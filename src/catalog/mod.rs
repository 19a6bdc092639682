//! Catalog lookups the estimators depend on: operators, relation sizes and indexes,
//! column statistics.

mod operator;
pub use operator::*;
mod relation;
pub use relation::*;
mod statistics;
pub use statistics::*;
