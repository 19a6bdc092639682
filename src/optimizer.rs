use serde::{Deserialize, Serialize};

use crate::cost::CostParams;

/// Fallback selectivities used whenever statistics can not answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectivityDefaults {
    /// `col = const` without statistics.
    pub eq_sel: f64,
    /// `col < const` and friends without statistics.
    pub ineq_sel: f64,
    /// Both bounds of a range query when either side fell back to `ineq_sel`.
    pub range_ineq_sel: f64,
    /// Pattern match operators.
    pub match_sel: f64,
    /// Distinct count guess when nothing else is known.
    pub num_distinct: f64,
    /// `IS NULL` / `IS UNKNOWN`.
    pub unk_sel: f64,
    pub not_unk_sel: f64,
    /// Boolean tests.
    pub bool_sel: f64,
}

impl Default for SelectivityDefaults {
    fn default() -> Self {
        Self {
            eq_sel: 0.005,
            ineq_sel: 0.3333333333333333,
            range_ineq_sel: 0.005,
            match_sel: 0.005,
            num_distinct: 200.0,
            unk_sel: 0.005,
            not_unk_sel: 1.0 - 0.005,
            bool_sel: 0.5,
        }
    }
}

/// Settings shared by one planning session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerContext {
    pub selectivity: SelectivityDefaults,
    pub cost: CostParams,
    /// Upper bound on entries read from a statistics slot.
    pub statistics_target: usize,
}

impl Default for OptimizerContext {
    fn default() -> Self {
        Self {
            selectivity: SelectivityDefaults::default(),
            cost: CostParams::default(),
            statistics_target: 100,
        }
    }
}
