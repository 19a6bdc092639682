use log::trace;

use crate::catalog::{AccessMethod, IndexKey, IndexOptInfo, StatisticKind, StatsGuard};
use crate::cost::{cost_qual_eval, Cost};
use crate::error::{invalid_input, OptResult};
use crate::expr::Expr;
use crate::operator::JoinType;
use crate::planner::{PlannerInfo, RelOptInfo};
use crate::selectivity::{clauselist_selectivity, Selectivity};

/// Estimated cost of scanning an index with a set of index quals. Heap access is not
/// included.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IndexCost {
    pub startup: Cost,
    pub total: Cost,
    /// Fraction of the relation's tuples the quals select.
    pub selectivity: Selectivity,
    /// Correlation between index order and heap order, in `[-1, 1]`.
    pub correlation: f64,
}

/// Costs scanning `index` of base relation `rel` with `quals`, by access method.
pub fn estimate_index_cost(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    let cost = match index.am {
        AccessMethod::BTree => btcostestimate(root, rel, index, quals)?,
        AccessMethod::Hash => hashcostestimate(root, rel, index, quals)?,
        AccessMethod::RTree => rtcostestimate(root, rel, index, quals)?,
        AccessMethod::Gist => gistcostestimate(root, rel, index, quals)?,
    };
    trace!(
        "Index {} ({}) with {} quals: {:?}",
        index.oid,
        index.am,
        quals.len(),
        cost
    );
    Ok(cost)
}

/// Cost model shared by all access methods.
///
/// Reads the metapage plus the share of the remaining pages that holds the selected
/// tuples, then pays per visited tuple for the tuple itself and each index qual.
pub fn genericcostestimate(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    let params = &root.context().cost;
    let relid = rel
        .relid()
        .ok_or_else(|| invalid_input(format!("index scan over join relation {}", rel.relids)))?;

    // predicate clauses also restrict the tuples in a partial index, unless repeated
    let mut selectivity_quals: Vec<Expr> = index
        .predicate
        .iter()
        .filter(|pred| !quals.contains(pred))
        .cloned()
        .collect();
    selectivity_quals.extend(quals.iter().cloned());

    let selectivity =
        clauselist_selectivity(root, &selectivity_quals, Some(relid), JoinType::Inner)?;

    let num_index_tuples = (selectivity * rel.tuples).min(index.tuples).max(1.0);

    let num_index_pages = if index.pages > 1.0 && index.tuples > 0.0 {
        ((num_index_tuples / index.tuples) * (index.pages - 1.0) + 1.0).ceil()
    } else {
        1.0
    };

    let qual_cost = cost_qual_eval(quals, params);
    let qual_op_cost = params.cpu_operator_cost * quals.len() as f64;
    let qual_arg_cost = (qual_cost.startup + qual_cost.per_tuple - qual_op_cost).max(0.0);

    let startup = qual_arg_cost;
    let total = num_index_pages * params.seq_page_cost
        + qual_arg_cost
        + num_index_tuples * (params.cpu_index_tuple_cost + qual_op_cost);

    Ok(IndexCost {
        startup: Cost::from(startup),
        total: Cost::from(total),
        selectivity,
        correlation: 0.0,
    })
}

/// Generic cost, plus the stored correlation of the leading key column.
pub fn btcostestimate(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    let mut cost = genericcostestimate(root, rel, index, quals)?;

    let sortop = match index.ordering.first() {
        Some(op) => *op,
        None => return Ok(cost),
    };
    let stats: Option<StatsGuard> = match index.keys.first() {
        Some(IndexKey::Column(attno)) => match rel.relid() {
            Some(relid) => root
                .rte(relid)?
                .relid
                .and_then(|relation| root.statistics().acquire_column(relation, *attno)),
            None => None,
        },
        // expression keys are analyzed under the index itself
        Some(IndexKey::Expr(_)) => root.statistics().acquire_index(index.oid, 1),
        None => None,
    };

    let correlation = stats.as_ref().and_then(|stats| {
        stats
            .slot(StatisticKind::Correlation, Some(sortop))
            .and_then(|slot| slot.numbers.first().copied())
    });
    if let Some(correlation) = correlation {
        // later columns dilute the order of the first
        cost.correlation = if index.ncolumns() > 1 {
            correlation * 0.75
        } else {
            correlation
        };
    }
    Ok(cost)
}

pub fn hashcostestimate(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    genericcostestimate(root, rel, index, quals)
}

pub fn rtcostestimate(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    genericcostestimate(root, rel, index, quals)
}

pub fn gistcostestimate(
    root: &PlannerInfo,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    quals: &[Expr],
) -> OptResult<IndexCost> {
    genericcostestimate(root, rel, index, quals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnStatistics, OperatorCatalog, StatisticsSlot};
    use crate::datum::{DataType, Datum, Oid};
    use crate::testing::{assert_close, op, planner, TableDef};

    fn lt() -> Oid {
        OperatorCatalog::builtin()
            .find_operator("<", DataType::Int4, DataType::Int4)
            .unwrap()
    }

    fn ordered_stats(correlation: f64) -> ColumnStatistics {
        ColumnStatistics {
            null_frac: 0.0,
            avg_width: 4,
            n_distinct: -1.0,
            slots: vec![
                StatisticsSlot {
                    kind: StatisticKind::Histogram,
                    op: lt(),
                    values: (0..=10).map(|i| Datum::Int4(i * 10)).collect(),
                    numbers: vec![],
                },
                StatisticsSlot {
                    kind: StatisticKind::Correlation,
                    op: lt(),
                    values: vec![],
                    numbers: vec![correlation],
                },
            ],
        }
    }

    fn btree(oid: Oid, keys: Vec<IndexKey>) -> IndexOptInfo {
        let ordering = vec![lt(); keys.len()];
        IndexOptInfo::new(oid, AccessMethod::BTree, keys)
            .with_ordering(ordering)
            .with_size(30.0, 10000.0)
    }

    fn x_below(root: &PlannerInfo, v: i32) -> Expr {
        Expr::op(
            op(root, "<", DataType::Int4),
            Expr::var(1, 1, DataType::Int4),
            Expr::constant(DataType::Int4, Datum::Int4(v)),
        )
    }

    #[test]
    fn test_btree_cost_with_correlation() {
        let root = planner(
            vec![TableDef::new(100, 100.0, 10000.0)
                .with_stats(1, ordered_stats(0.8))
                .with_index(btree(500, vec![IndexKey::Column(1)]))],
            vec![],
        );
        let rel = root.find_base_rel(1).unwrap();
        let index = &rel.indexlist[0];
        let cost = estimate_index_cost(&root, rel, index, &[x_below(&root, 50)]).unwrap();

        assert_close(cost.selectivity, 0.5);
        assert_eq!(cost.startup.value(), 0.0);
        // 16 pages, 5000 tuples at 0.001 + 0.0025
        assert_close(cost.total.value(), 33.5);
        assert_close(cost.correlation, 0.8);
        assert_eq!(root.statistics().outstanding(), 0);
    }

    #[test]
    fn test_multicolumn_btree_dampens_correlation() {
        let root = planner(
            vec![TableDef::new(100, 100.0, 10000.0)
                .with_stats(1, ordered_stats(0.8))
                .with_index(btree(
                    500,
                    vec![IndexKey::Column(1), IndexKey::Column(2)],
                ))],
            vec![],
        );
        let rel = root.find_base_rel(1).unwrap();
        let cost =
            estimate_index_cost(&root, rel, &rel.indexlist[0], &[x_below(&root, 50)]).unwrap();
        assert_close(cost.correlation, 0.6);
    }

    #[test]
    fn test_expression_key_uses_index_statistics() {
        let key = IndexKey::function(77, DataType::Int4, &[(1, DataType::Int4)]);
        let root = planner(
            vec![TableDef::new(100, 100.0, 10000.0)
                .with_index(btree(500, vec![key]))
                .with_index_stats(500, 1, ordered_stats(-0.5))],
            vec![],
        );
        let rel = root.find_base_rel(1).unwrap();
        let cost = estimate_index_cost(&root, rel, &rel.indexlist[0], &[]).unwrap();
        assert_close(cost.correlation, -0.5);
        // nothing restricts the scan: every page, every tuple
        assert_close(cost.selectivity, 1.0);
        assert_close(cost.total.value(), 30.0 + 10000.0 * 0.001);
    }

    #[test]
    fn test_few_tuples_clamp_to_one() {
        let root = planner(
            vec![TableDef::new(100, 100.0, 10000.0)
                .with_stats(1, ordered_stats(0.8))
                .with_index(btree(500, vec![IndexKey::Column(1)]))],
            vec![],
        );
        let rel = root.find_base_rel(1).unwrap();
        let cost =
            estimate_index_cost(&root, rel, &rel.indexlist[0], &[x_below(&root, -10)]).unwrap();
        // 0.0001 * 10000 = 1 tuple, on one leaf page after the metapage
        assert_close(cost.total.value(), 2.0 + 0.0035);
    }

    #[test]
    fn test_partial_index_counts_predicate_once() {
        let pred = Expr::op(
            lt(),
            Expr::var(1, 1, DataType::Int4),
            Expr::constant(DataType::Int4, Datum::Int4(50)),
        );
        let root = planner(
            vec![TableDef::new(100, 100.0, 10000.0)
                .with_stats(1, ordered_stats(0.8))
                .with_index(
                    IndexOptInfo::new(500, AccessMethod::Hash, vec![IndexKey::Column(1)])
                        .with_predicate(vec![pred.clone()])
                        .with_size(30.0, 5000.0),
                )],
            vec![],
        );
        let rel = root.find_base_rel(1).unwrap();
        let index = &rel.indexlist[0];

        let repeated = estimate_index_cost(&root, rel, index, &[pred]).unwrap();
        assert_close(repeated.selectivity, 0.5);

        let implicit = estimate_index_cost(&root, rel, index, &[]).unwrap();
        assert_close(implicit.selectivity, 0.5);
        // unordered access method
        assert_eq!(implicit.correlation, 0.0);
    }
}
