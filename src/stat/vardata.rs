use log::trace;

use crate::catalog::{ColumnStatistics, ComparisonOperator, IndexKey, StatisticKind, StatsGuard};
use crate::datum::{DataType, Datum, Oid};
use crate::error::{invalid_input, OptResult};
use crate::expr::{AttrNumber, Expr};
use crate::planner::{PlannerInfo, RelOptInfo};
use crate::relids::{Membership, RtIndex};

/// Row identifier system column.
pub const SELF_ITEM_POINTER_ATTRIBUTE_NUMBER: AttrNumber = -1;
pub const OBJECT_ID_ATTRIBUTE_NUMBER: AttrNumber = -2;
pub const TABLE_OID_ATTRIBUTE_NUMBER: AttrNumber = -7;

/// An expression bound to its relation and statistics for the duration of one
/// estimator call. Dropping it hands the statistics snapshot back.
#[derive(Debug)]
pub struct VariableStatData<'a> {
    /// The expression, with relabeling stripped when it belongs to a relation.
    pub var: Expr,
    pub rel: Option<&'a RelOptInfo>,
    pub stats: Option<StatsGuard>,
    /// Type the expression exposes to the operator.
    pub vartype: DataType,
    /// Type the statistics were gathered with.
    pub atttype: DataType,
    pub atttypmod: i32,
    /// A unique index proves the values distinct.
    pub is_unique: bool,
    statistics_target: usize,
}

/// Values and numbers of one statistics slot, cut to the statistics target.
#[derive(Clone, Copy, Debug)]
pub struct AttStatsSlot<'s> {
    pub values: &'s [Datum],
    pub numbers: &'s [f64],
}

impl<'a> VariableStatData<'a> {
    pub fn stats(&self) -> Option<&ColumnStatistics> {
        self.stats.as_deref()
    }

    pub fn has_stats(&self) -> bool {
        self.stats.is_some()
    }

    pub fn null_frac(&self) -> f64 {
        self.stats().map(|s| s.null_frac).unwrap_or(0.0)
    }

    pub fn slot(&self, kind: StatisticKind, op: Option<Oid>) -> Option<AttStatsSlot<'_>> {
        let slot = self.stats()?.slot(kind, op)?;
        let limit = self.statistics_target;
        Some(AttStatsSlot {
            values: &slot.values[..slot.values.len().min(limit)],
            numbers: &slot.numbers[..slot.numbers.len().min(limit)],
        })
    }
}

/// Binds `node` to a relation and its statistics.
///
/// With `var_relid` set, only Vars of that relation count as variables; anything else is
/// treated as a constant. Without it, an expression over several relations binds to the
/// join relation of exactly those relations, if one has been built.
pub fn examine_variable<'a>(
    root: &'a PlannerInfo,
    node: &Expr,
    var_relid: Option<RtIndex>,
) -> OptResult<VariableStatData<'a>> {
    let vartype = node.expr_type();
    let mut vardata = VariableStatData {
        var: node.clone(),
        rel: None,
        stats: None,
        vartype,
        atttype: vartype,
        atttypmod: node.expr_typmod(),
        is_unique: false,
        statistics_target: root.context().statistics_target,
    };

    let basenode = node.strip_relabel();

    if let Expr::Var(var) = basenode {
        if var_relid.map_or(true, |r| r == var.varno) {
            vardata.var = basenode.clone();
            vardata.rel = Some(root.find_base_rel(var.varno)?);
            vardata.atttype = var.vartype;
            vardata.atttypmod = var.vartypmod;
            if let Some(relation) = root.rte(var.varno)?.relid {
                vardata.stats = root.statistics().acquire_column(relation, var.varattno);
            }
            return Ok(vardata);
        }
    }

    let varnos = basenode.varnos();
    let mut onerel = None;
    match varnos.membership() {
        // pseudo-constant
        Membership::Empty => {}
        Membership::Singleton(relid) => {
            if var_relid.map_or(true, |r| r == relid) {
                let rel = root.find_base_rel(relid)?;
                vardata.rel = Some(rel);
                onerel = Some(rel);
            }
        }
        Membership::Multiple => match var_relid {
            None => vardata.rel = root.find_join_rel(&varnos),
            Some(r) if varnos.contains(r) => vardata.rel = Some(root.find_base_rel(r)?),
            Some(_) => {}
        },
    }

    if vardata.rel.is_some() {
        vardata.var = basenode.clone();
        vardata.atttype = basenode.expr_type();
        vardata.atttypmod = basenode.expr_typmod();
    }

    if let Some(rel) = onerel {
        'indexes: for index in rel.indexlist.iter().filter(|i| !i.is_partial()) {
            for (pos, key) in index.keys.iter().enumerate() {
                let indexkey = match key {
                    IndexKey::Expr(e) => e.strip_relabel(),
                    IndexKey::Column(_) => continue,
                };
                if indexkey != basenode {
                    continue;
                }
                if index.unique && index.ncolumns() == 1 {
                    vardata.is_unique = true;
                }
                vardata.stats = root
                    .statistics()
                    .acquire_index(index.oid, pos as AttrNumber + 1);
                if vardata.stats.is_some() {
                    trace!("Using statistics of index {} for {}", index.oid, basenode);
                    break 'indexes;
                }
            }
        }
    }

    Ok(vardata)
}

/// A restriction clause split into the variable side and the other side.
#[derive(Debug)]
pub struct RestrictionVariable<'a> {
    pub vardata: VariableStatData<'a>,
    /// The non-variable operand, constant folded where possible.
    pub other: Expr,
    pub var_on_left: bool,
}

/// Examines both operands of `var op other`. `None` when neither or both operands are
/// variables of the restricted relation.
pub fn get_restriction_variable<'a>(
    root: &'a PlannerInfo,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Option<RestrictionVariable<'a>>> {
    if args.len() != 2 {
        return Err(invalid_input(format!(
            "restriction clause needs two arguments, got {}",
            args.len()
        )));
    }

    let left = examine_variable(root, &args[0], var_relid)?;
    let right = examine_variable(root, &args[1], var_relid)?;

    match (left.rel.is_some(), right.rel.is_some()) {
        (true, false) => Ok(Some(RestrictionVariable {
            other: right.var.estimate_expression_value(),
            vardata: left,
            var_on_left: true,
        })),
        (false, true) => Ok(Some(RestrictionVariable {
            other: left.var.estimate_expression_value(),
            vardata: right,
            var_on_left: false,
        })),
        _ => Ok(None),
    }
}

/// Examines both operands of a join clause.
pub fn get_join_variables<'a>(
    root: &'a PlannerInfo,
    args: &[Expr],
) -> OptResult<(VariableStatData<'a>, VariableStatData<'a>)> {
    if args.len() != 2 {
        return Err(invalid_input(format!(
            "join clause needs two arguments, got {}",
            args.len()
        )));
    }
    Ok((
        examine_variable(root, &args[0], None)?,
        examine_variable(root, &args[1], None)?,
    ))
}

/// Estimated number of distinct values of the variable, never below 1.
pub fn get_variable_numdistinct(root: &PlannerInfo, vardata: &VariableStatData) -> f64 {
    let default = root.context().selectivity.num_distinct;

    let mut stadistinct = match vardata.stats() {
        Some(stats) => stats.n_distinct,
        None if vardata.vartype == DataType::Bool => 2.0,
        None => match &vardata.var {
            Expr::Var(v) => match v.varattno {
                OBJECT_ID_ATTRIBUTE_NUMBER | SELF_ITEM_POINTER_ATTRIBUTE_NUMBER => -1.0,
                TABLE_OID_ATTRIBUTE_NUMBER => 1.0,
                _ => 0.0,
            },
            _ => 0.0,
        },
    };

    // a unique index wins over possibly stale statistics
    if stadistinct != -1.0 {
        let unique_column = match (&vardata.var, vardata.rel) {
            (Expr::Var(v), Some(rel)) => rel.has_unique_index(v.varattno),
            _ => false,
        };
        if vardata.is_unique || unique_column {
            stadistinct = -1.0;
        }
    }

    if stadistinct > 0.0 {
        return stadistinct;
    }

    let ntuples = match vardata.rel {
        Some(rel) if rel.tuples > 0.0 => rel.tuples,
        _ => return default,
    };

    if stadistinct < 0.0 {
        return (-stadistinct * ntuples + 0.5).floor().max(1.0);
    }

    if ntuples < default {
        ntuples
    } else {
        default
    }
}

/// Largest value of the variable according to its statistics, ordered by `sortop`.
pub fn get_variable_maximum(
    root: &PlannerInfo,
    vardata: &VariableStatData,
    sortop: Oid,
) -> OptResult<Option<Datum>> {
    if !vardata.has_stats() {
        return Ok(None);
    }

    let mut tmax = None;
    if let Some(hist) = vardata.slot(StatisticKind::Histogram, Some(sortop)) {
        tmax = hist.values.last().cloned();
    } else if let Some(hist) = root
        .operators()
        .commutator(sortop)
        .and_then(|rsortop| vardata.slot(StatisticKind::Histogram, Some(rsortop)))
    {
        // descending histogram
        tmax = hist.values.first().cloned();
    } else if vardata.slot(StatisticKind::Histogram, None).is_some() {
        // built with an unrelated ordering, can not be trusted
        return Ok(None);
    }

    if let Some(mcv) = vardata.slot(StatisticKind::Mcv, None) {
        let proc = &root.operators().lookup(sortop)?.proc;
        for value in mcv.values {
            tmax = match tmax {
                Some(current) if !proc.evaluate(&current, value) => Some(current),
                _ => Some(value.clone()),
            };
        }
    }

    Ok(tmax)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AccessMethod, IndexOptInfo, OperatorCatalog, StatisticsSlot};
    use crate::testing::{planner, TableDef};

    fn stats(n_distinct: f64, slots: Vec<StatisticsSlot>) -> ColumnStatistics {
        ColumnStatistics {
            null_frac: 0.0,
            avg_width: 4,
            n_distinct,
            slots,
        }
    }

    fn numdistinct(root: &PlannerInfo, expr: Expr) -> f64 {
        let vardata = examine_variable(root, &expr, None).unwrap();
        get_variable_numdistinct(root, &vardata)
    }

    #[test]
    fn test_numdistinct() {
        let table = TableDef::new(100, 10.0, 1000.0)
            .with_stats(1, stats(-0.25, vec![]))
            .with_stats(2, stats(30.0, vec![]))
            .with_stats(3, stats(-1.0, vec![]));
        let root = planner(vec![table, TableDef::new(200, 1.0, 50.0)], vec![]);

        assert_eq!(numdistinct(&root, Expr::var(1, 1, DataType::Int4)), 250.0);
        assert_eq!(numdistinct(&root, Expr::var(1, 2, DataType::Int4)), 30.0);
        assert_eq!(numdistinct(&root, Expr::var(1, 3, DataType::Int4)), 1000.0);
        // no statistics: the default, or the row count when smaller
        assert_eq!(numdistinct(&root, Expr::var(1, 4, DataType::Int4)), 200.0);
        assert_eq!(numdistinct(&root, Expr::var(2, 4, DataType::Int4)), 50.0);
        assert_eq!(numdistinct(&root, Expr::var(1, 5, DataType::Bool)), 2.0);
        assert_eq!(
            numdistinct(&root, Expr::var(1, SELF_ITEM_POINTER_ATTRIBUTE_NUMBER, DataType::Int4)),
            1000.0
        );
        assert_eq!(
            numdistinct(&root, Expr::var(1, TABLE_OID_ATTRIBUTE_NUMBER, DataType::Int4)),
            1.0
        );
        assert_eq!(root.statistics().outstanding(), 0);
    }

    #[test]
    fn test_unique_index_overrides_statistics() {
        let table = TableDef::new(100, 10.0, 1000.0)
            .with_stats(1, stats(10.0, vec![]))
            .with_index(
                IndexOptInfo::new(500, AccessMethod::BTree, vec![IndexKey::Column(1)])
                    .with_unique(true),
            );
        let root = planner(vec![table], vec![]);
        assert_eq!(numdistinct(&root, Expr::var(1, 1, DataType::Int4)), 1000.0);
    }

    #[test]
    fn test_examine_variable_binding() {
        let table = TableDef::new(100, 10.0, 1000.0).with_stats(1, stats(10.0, vec![]));
        let root = planner(vec![table, TableDef::new(200, 1.0, 50.0)], vec![]);

        let relabeled = Expr::relabel(Expr::var(1, 1, DataType::Int4), DataType::Int8);
        let vardata = examine_variable(&root, &relabeled, Some(1)).unwrap();
        assert_eq!(vardata.var, Expr::var(1, 1, DataType::Int4));
        assert_eq!(vardata.vartype, DataType::Int8);
        assert_eq!(vardata.atttype, DataType::Int4);
        assert!(vardata.has_stats());
        assert_eq!(root.statistics().outstanding(), 1);
        drop(vardata);
        assert_eq!(root.statistics().outstanding(), 0);

        // another relation's Var is a constant here
        let other = examine_variable(&root, &Expr::var(2, 1, DataType::Int4), Some(1)).unwrap();
        assert!(other.rel.is_none());

        let args = [Expr::var(1, 1, DataType::Int4)];
        assert!(get_restriction_variable(&root, &args, Some(1)).is_err());
        assert!(get_join_variables(&root, &args).is_err());
    }

    #[test]
    fn test_variable_maximum() {
        let operators = OperatorCatalog::builtin();
        let lt = operators.find_operator("<", DataType::Int4, DataType::Int4).unwrap();
        let gt = operators.find_operator(">", DataType::Int4, DataType::Int4).unwrap();

        let int4 = |values: &[i32]| values.iter().map(|v| Datum::Int4(*v)).collect::<Vec<_>>();
        let table = TableDef::new(100, 10.0, 1000.0)
            .with_stats(
                1,
                stats(
                    10.0,
                    vec![
                        StatisticsSlot {
                            kind: StatisticKind::Histogram,
                            op: lt,
                            values: int4(&[1, 5, 9]),
                            numbers: vec![],
                        },
                        StatisticsSlot {
                            kind: StatisticKind::Mcv,
                            op: 0,
                            values: int4(&[3, 12]),
                            numbers: vec![0.2, 0.1],
                        },
                    ],
                ),
            )
            .with_stats(
                2,
                stats(
                    10.0,
                    vec![StatisticsSlot {
                        kind: StatisticKind::Histogram,
                        op: gt,
                        values: int4(&[9, 5, 1]),
                        numbers: vec![],
                    }],
                ),
            );
        let root = planner(vec![table], vec![]);

        let maximum = |attno| {
            let var = Expr::var(1, attno, DataType::Int4);
            let vardata = examine_variable(&root, &var, None).unwrap();
            get_variable_maximum(&root, &vardata, lt).unwrap()
        };
        assert_eq!(maximum(1), Some(Datum::Int4(12)));
        // descending histogram
        assert_eq!(maximum(2), Some(Datum::Int4(9)));
        assert_eq!(maximum(3), None);
    }
}
