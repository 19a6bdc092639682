//! Cost units, the cost of sorting and the index access cost estimator.

use std::fmt::{Display, Formatter};

use derive_more::{Add, AddAssign, From, Into, Mul, Sub};
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

mod index;
pub use index::*;

/// Abstract cost, in units of one sequential page fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, From, Into, Add, AddAssign, Sub, Mul)]
pub struct Cost(f64);

impl Cost {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Planner cost knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    pub seq_page_cost: f64,
    pub random_page_cost: f64,
    pub cpu_tuple_cost: f64,
    pub cpu_index_tuple_cost: f64,
    pub cpu_operator_cost: f64,
    /// Size assumed for relations that are not stored tables.
    pub placeholder_pages: f64,
    pub placeholder_tuples: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            seq_page_cost: 1.0,
            random_page_cost: 4.0,
            cpu_tuple_cost: 0.01,
            cpu_index_tuple_cost: 0.001,
            cpu_operator_cost: 0.0025,
            placeholder_pages: 10.0,
            placeholder_tuples: 1000.0,
        }
    }
}

/// Cost of evaluating a list of quals: once per scan, and once per tuple.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QualCost {
    pub startup: f64,
    pub per_tuple: f64,
}

pub fn cost_qual_eval<'a, I>(quals: I, params: &CostParams) -> QualCost
where
    I: IntoIterator<Item = &'a Expr>,
{
    let per_tuple = quals
        .into_iter()
        .map(|q| q.count_operators() as f64 * params.cpu_operator_cost)
        .sum();
    QualCost {
        startup: 0.0,
        per_tuple,
    }
}

/// Cost of a path: before the first row is returned, and for all rows.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathCost {
    pub startup: Cost,
    pub total: Cost,
}

impl PathCost {
    pub fn new(startup: f64, total: f64) -> Self {
        Self {
            startup: Cost::from(startup),
            total: Cost::from(total),
        }
    }
}

/// Sorting `tuples` rows produced at `input_cost`. All comparisons happen before the
/// first row comes out, about `N log2 N` of them at two operator calls each.
pub fn cost_sort(input_cost: Cost, tuples: f64, params: &CostParams) -> PathCost {
    let tuples = tuples.max(2.0);
    let startup =
        input_cost.value() + 2.0 * params.cpu_operator_cost * tuples * tuples.log2();
    PathCost::new(startup, startup + params.cpu_operator_cost * tuples)
}
