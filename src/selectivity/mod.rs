//! Selectivity estimators: the fraction of rows a predicate is expected to keep.
//!
//! Every estimator returns a value in `[0, 1]`. Missing statistics never fail an
//! estimate; the defaults of [`SelectivityDefaults`](crate::optimizer::SelectivityDefaults)
//! are used instead. Only dangling catalog identifiers and malformed clauses are errors.

use log::trace;

use crate::catalog::{JoinEstimator, RestrictEstimator};
use crate::datum::Oid;
use crate::error::OptResult;
use crate::expr::Expr;
use crate::operator::JoinType;
use crate::planner::PlannerInfo;
use crate::relids::RtIndex;

mod clause;
pub use clause::*;
mod groups;
pub use groups::*;
mod join;
pub use join::*;
mod pattern;
pub use pattern::*;
mod restriction;
pub use restriction::*;

/// Fraction of rows, in `[0, 1]`.
pub type Selectivity = f64;

pub fn clamp_probability(p: Selectivity) -> Selectivity {
    if p < 0.0 {
        0.0
    } else if p > 1.0 {
        1.0
    } else {
        p
    }
}

/// Selectivity of `args[0] op args[1]` as a restriction of relation `var_relid`, or of
/// any relation when `None`.
pub fn estimate_restriction_selectivity(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    let estimator = root.operators().lookup(opno)?.restrict;
    let selec = match estimator {
        Some(RestrictEstimator::Eq) => eqsel(root, opno, args, var_relid)?,
        Some(RestrictEstimator::Neq) => neqsel(root, opno, args, var_relid)?,
        Some(RestrictEstimator::ScalarLt) => scalarltsel(root, opno, args, var_relid)?,
        Some(RestrictEstimator::ScalarGt) => scalargtsel(root, opno, args, var_relid)?,
        Some(RestrictEstimator::Match(ptype)) => patternsel(root, args, var_relid, ptype)?,
        Some(RestrictEstimator::NotMatch(ptype)) => {
            1.0 - patternsel(root, args, var_relid, ptype)?
        }
        None => root.context().selectivity.bool_sel,
    };
    trace!(
        "Restriction selectivity of operator {} with {:?}: {}",
        opno,
        estimator,
        selec
    );
    Ok(clamp_probability(selec))
}

/// Selectivity of the join clause `args[0] op args[1]`, relative to the cartesian
/// product of the inputs.
pub fn estimate_join_selectivity(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let defaults = &root.context().selectivity;
    let estimator = root.operators().lookup(opno)?.join;
    let selec = match estimator {
        Some(JoinEstimator::Eq) => eqjoinsel(root, opno, args, join_type)?,
        Some(JoinEstimator::Neq) => neqjoinsel(root, opno, args, join_type)?,
        Some(JoinEstimator::ScalarLt) | Some(JoinEstimator::ScalarGt) => defaults.ineq_sel,
        Some(JoinEstimator::Match(_)) => defaults.match_sel,
        Some(JoinEstimator::NotMatch(_)) => 1.0 - defaults.match_sel,
        None => defaults.bool_sel,
    };
    trace!(
        "Join selectivity of operator {} with {:?} ({}): {}",
        opno,
        estimator,
        join_type,
        selec
    );
    Ok(clamp_probability(selec))
}
