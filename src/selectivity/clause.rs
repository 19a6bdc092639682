use log::trace;

use crate::catalog::RestrictEstimator;
use crate::datum::{DataType, Datum};
use crate::error::{lookup_error, OptResult};
use crate::expr::{Const, Expr, NullTestType};
use crate::operator::JoinType;
use crate::planner::PlannerInfo;
use crate::relids::RtIndex;
use crate::selectivity::{
    booltestsel, clamp_probability, estimate_join_selectivity, estimate_restriction_selectivity,
    nulltestsel, Selectivity,
};

/// Fixed guess for a boolean function call.
const FUNC_SEL: Selectivity = 0.3333333;

/// Selectivity of one boolean clause.
///
/// `var_relid` restricts the estimate to one relation: Vars of other relations are taken
/// as unknown constants. With `None`, an operator clause over several relations is
/// estimated as a join clause of kind `join_type`.
pub fn clause_selectivity(
    root: &PlannerInfo,
    clause: &Expr,
    var_relid: Option<RtIndex>,
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let selec = match clause {
        Expr::Var(var) if var_relid.map_or(true, |r| r == var.varno) => {
            match root.rte(var.varno)?.relid {
                // a boolean column is treated as `var = true`
                Some(_) => {
                    let opno = root
                        .operators()
                        .find_operator("=", DataType::Bool, DataType::Bool)
                        .ok_or_else(|| lookup_error("operator", "= (bool, bool)"))?;
                    let args = [clause.clone(), Expr::constant(DataType::Bool, Datum::Bool(true))];
                    estimate_restriction_selectivity(root, opno, &args, var_relid)?
                }
                None => 1.0,
            }
        }
        Expr::Const(Const { value, .. }) => match value {
            Some(Datum::Bool(true)) => 1.0,
            _ => 0.0,
        },
        Expr::Not(arg) => 1.0 - clause_selectivity(root, arg, var_relid, join_type)?,
        Expr::And(args) => clauselist_selectivity(root, args, var_relid, join_type)?,
        Expr::Or(args) => {
            // treats the arms as independent: s1 + s2 - s1 * s2
            let mut selec = 0.0;
            for arg in args {
                let s2 = clause_selectivity(root, arg, var_relid, join_type)?;
                selec = selec + s2 - selec * s2;
            }
            selec
        }
        Expr::Op(op) => {
            if var_relid.is_none() && clause.varnos().len() > 1 {
                estimate_join_selectivity(root, op.opno, &op.args, join_type)?
            } else {
                estimate_restriction_selectivity(root, op.opno, &op.args, var_relid)?
            }
        }
        Expr::Func(_) => FUNC_SEL,
        Expr::BoolTest(test) => booltestsel(root, test.test, &test.arg, var_relid, join_type)?,
        Expr::NullTest(test) => nulltestsel(root, test.test, &test.arg, var_relid)?,
        Expr::Relabel(relabel) => clause_selectivity(root, &relabel.arg, var_relid, join_type)?,
        _ => 1.0,
    };
    trace!("Selectivity of {}: {}", clause, selec);
    Ok(selec)
}

/// Bounds collected for one variable from `var < x` and `var > y` clauses.
#[derive(Debug)]
struct RangeQueryClause<'c> {
    var: &'c Expr,
    lobound: Option<Selectivity>,
    hibound: Option<Selectivity>,
}

fn add_range_clause<'c>(
    ranges: &mut Vec<RangeQueryClause<'c>>,
    var: &'c Expr,
    is_lobound: bool,
    selec: Selectivity,
) {
    let tighten = |bound: &mut Option<Selectivity>| {
        *bound = Some(bound.map_or(selec, |b| b.min(selec)));
    };
    match ranges.iter_mut().find(|r| r.var == var) {
        Some(range) => {
            if is_lobound {
                tighten(&mut range.lobound);
            } else {
                tighten(&mut range.hibound);
            }
        }
        None => ranges.push(RangeQueryClause {
            var,
            lobound: is_lobound.then(|| selec),
            hibound: (!is_lobound).then(|| selec),
        }),
    }
}

/// Whether `expr` is fixed while scanning: free of volatile functions and, when estimating
/// for `var_relid`, of that relation's Vars. Vars of other relations count as parameters.
fn is_range_bound(expr: &Expr, var_relid: Option<RtIndex>) -> bool {
    match var_relid {
        Some(relid) => !expr.varnos().contains(relid) && !expr.contain_volatile_functions(),
        None => expr.is_pseudo_constant(),
    }
}

/// Selectivity of an implicitly ANDed list of clauses.
///
/// Clauses are assumed independent, except that a lower and an upper bound on the same
/// variable are recognized as a range. The range is estimated as `hi + lo - 1`, instead
/// of the product, which badly overestimates narrow ranges.
pub fn clauselist_selectivity(
    root: &PlannerInfo,
    clauses: &[Expr],
    var_relid: Option<RtIndex>,
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let defaults = &root.context().selectivity;
    let mut selec = 1.0;
    let mut ranges: Vec<RangeQueryClause> = vec![];

    for clause in clauses {
        let s2 = clause_selectivity(root, clause, var_relid, join_type)?;

        if let Some((opno, left, right)) = clause.binary_args() {
            if var_relid.is_some() || clause.varnos().len() == 1 {
                let (left_bound, right_bound) =
                    (is_range_bound(left, var_relid), is_range_bound(right, var_relid));
                let var_on_left = match (left_bound, right_bound) {
                    (false, true) => Some(true),
                    (true, false) => Some(false),
                    _ => None,
                };
                if let Some(var_on_left) = var_on_left {
                    let var = if var_on_left { left } else { right };
                    match root.operators().lookup(opno)?.restrict {
                        Some(RestrictEstimator::ScalarLt) => {
                            add_range_clause(&mut ranges, var, !var_on_left, s2)
                        }
                        Some(RestrictEstimator::ScalarGt) => {
                            add_range_clause(&mut ranges, var, var_on_left, s2)
                        }
                        _ => selec *= s2,
                    }
                    continue;
                }
            }
        }
        selec *= s2;
    }

    for range in ranges {
        match (range.lobound, range.hibound) {
            (Some(lo), Some(hi)) => {
                let s2 = if lo == defaults.ineq_sel || hi == defaults.ineq_sel {
                    defaults.range_ineq_sel
                } else {
                    // lo and hi both count the nulls as excluded, add them back once
                    let s2 = hi + lo - 1.0
                        + nulltestsel(root, NullTestType::IsNull, range.var, var_relid)?;
                    if s2 > 0.0 {
                        s2
                    } else if s2 < -0.01 {
                        // contradictory bounds or bad statistics
                        defaults.range_ineq_sel
                    } else {
                        1.0e-10
                    }
                };
                trace!("Range on {} from {} and {}: {}", range.var, lo, hi, s2);
                selec *= s2;
            }
            (Some(bound), None) | (None, Some(bound)) => selec *= bound,
            (None, None) => {}
        }
    }

    Ok(clamp_probability(selec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnStatistics, StatisticKind, StatisticsSlot};
    use crate::testing::{assert_close, op, planner, TableDef};

    fn int_hist_stats() -> ColumnStatistics {
        ColumnStatistics {
            null_frac: 0.0,
            avg_width: 4,
            n_distinct: -1.0,
            slots: vec![StatisticsSlot {
                kind: StatisticKind::Histogram,
                op: 0,
                values: (0..=10).map(|i| Datum::Int4(i * 10)).collect(),
                numbers: vec![],
            }],
        }
    }

    fn root() -> PlannerInfo {
        planner(
            vec![
                TableDef::new(100, 10.0, 1000.0).with_stats(1, int_hist_stats()),
                TableDef::new(200, 10.0, 1000.0),
            ],
            vec![],
        )
    }

    fn x() -> Expr {
        Expr::var(1, 1, DataType::Int4)
    }

    fn int(v: i32) -> Expr {
        Expr::constant(DataType::Int4, Datum::Int4(v))
    }

    fn cmp(root: &PlannerInfo, name: &str, l: Expr, r: Expr) -> Expr {
        Expr::op(op(root, name, DataType::Int4), l, r)
    }

    #[test]
    fn test_constant_clauses() {
        let root = root();
        let sel = |c: Expr| clause_selectivity(&root, &c, None, JoinType::Inner).unwrap();
        assert_eq!(sel(Expr::constant(DataType::Bool, Datum::Bool(true))), 1.0);
        assert_eq!(sel(Expr::constant(DataType::Bool, Datum::Bool(false))), 0.0);
        assert_eq!(sel(Expr::null(DataType::Bool)), 0.0);
        assert_eq!(
            sel(Expr::Not(Box::new(Expr::constant(DataType::Bool, Datum::Bool(false))))),
            1.0
        );
    }

    #[test]
    fn test_boolean_column_without_stats() {
        let root = planner(vec![TableDef::new(100, 10.0, 1000.0)], vec![]);
        let flag = Expr::var(1, 3, DataType::Bool);
        assert_close(
            clause_selectivity(&root, &flag, Some(1), JoinType::Inner).unwrap(),
            0.5,
        );
    }

    #[test]
    fn test_or_combines_independently() {
        let root = root();
        let clause = Expr::Or(vec![
            cmp(&root, "<", x(), int(50)),
            cmp(&root, "<", x(), int(20)),
        ]);
        // 0.5 + 0.2 - 0.1
        assert_close(
            clause_selectivity(&root, &clause, Some(1), JoinType::Inner).unwrap(),
            0.6,
        );
    }

    #[test]
    fn test_range_pair() {
        let root = root();
        let clauses = vec![
            cmp(&root, ">", x(), int(20)),
            cmp(&root, "<", x(), int(50)),
        ];
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(1), JoinType::Inner).unwrap(),
            0.3,
        );

        // same range with the constant on the left
        let clauses = vec![
            cmp(&root, "<", int(20), x()),
            cmp(&root, "<", x(), int(50)),
        ];
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(1), JoinType::Inner).unwrap(),
            0.3,
        );
    }

    #[test]
    fn test_range_keeps_tighter_bound() {
        let root = root();
        let clauses = vec![
            cmp(&root, "<", x(), int(50)),
            cmp(&root, "<", x(), int(30)),
        ];
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(1), JoinType::Inner).unwrap(),
            0.3,
        );
    }

    #[test]
    fn test_contradictory_range() {
        let root = root();
        let clauses = vec![
            cmp(&root, ">", x(), int(60)),
            cmp(&root, "<", x(), int(30)),
        ];
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(1), JoinType::Inner).unwrap(),
            root.context().selectivity.range_ineq_sel,
        );
    }

    #[test]
    fn test_range_without_stats() {
        let root = root();
        let y = Expr::var(2, 1, DataType::Int4);
        let clauses = vec![
            cmp(&root, ">", y.clone(), int(20)),
            cmp(&root, "<", y, int(50)),
        ];
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(2), JoinType::Inner).unwrap(),
            root.context().selectivity.range_ineq_sel,
        );
    }

    #[test]
    fn test_range_against_outer_parameters() {
        let root = root();
        let lo = Expr::var(2, 1, DataType::Int4);
        let hi = Expr::var(2, 2, DataType::Int4);
        let clauses = vec![cmp(&root, ">", x(), lo), cmp(&root, "<", x(), hi)];
        // both bounds are default guesses, so the pair is a default range
        assert_close(
            clauselist_selectivity(&root, &clauses, Some(1), JoinType::Inner).unwrap(),
            root.context().selectivity.range_ineq_sel,
        );
    }

    #[test]
    fn test_join_clause_in_list() {
        let root = root();
        let clauses = vec![
            cmp(&root, "=", x(), Expr::var(2, 1, DataType::Int4)),
            cmp(&root, "<", x(), int(50)),
        ];
        // x has 1000 distinct values: 1/1000 * 0.5
        assert_close(
            clauselist_selectivity(&root, &clauses, None, JoinType::Inner).unwrap(),
            0.0005,
        );
    }
}
