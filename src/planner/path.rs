use std::cmp::Ordering;
use std::rc::Rc;

use log::trace;

use crate::cost::Cost;
use crate::error::OptResult;
use crate::operator::{PhysicalOperator, PhysicalOperatorTrait};
use crate::planner::{PlannerInfo, RelId, RelOptInfo};
use crate::properties::{compare_pathkeys, PathKeys, PathKeysComparison};

/// One way of producing the rows of a relation.
#[derive(Clone, Debug)]
pub struct Path {
    pub parent: RelId,
    pub operator: PhysicalOperator,
    pub rows: f64,
    pub startup_cost: Cost,
    pub total_cost: Cost,
    /// Output ordering.
    pub pathkeys: PathKeys,
}

impl Path {
    /// Costs `operator` as a way of producing `rel`.
    pub fn new(
        root: &PlannerInfo,
        rel: &RelOptInfo,
        operator: PhysicalOperator,
        pathkeys: PathKeys,
    ) -> OptResult<Self> {
        let cost = operator.cost(root, rel)?;
        Ok(Self {
            parent: rel.id,
            operator,
            rows: rel.rows,
            startup_cost: cost.startup,
            total_cost: cost.total,
            pathkeys,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostCriterion {
    Startup,
    Total,
}

/// Orders by `criterion`, breaking ties with the other cost.
pub fn compare_path_costs(a: &Path, b: &Path, criterion: CostCriterion) -> Ordering {
    let (first, second) = match criterion {
        CostCriterion::Startup => (
            a.startup_cost.partial_cmp(&b.startup_cost),
            a.total_cost.partial_cmp(&b.total_cost),
        ),
        CostCriterion::Total => (
            a.total_cost.partial_cmp(&b.total_cost),
            a.startup_cost.partial_cmp(&b.startup_cost),
        ),
    };
    first
        .unwrap_or(Ordering::Equal)
        .then(second.unwrap_or(Ordering::Equal))
}

/// Adds `new_path` to `pathlist` unless an existing path is at least as cheap and at
/// least as well ordered; removes existing paths `new_path` dominates.
pub fn add_path(pathlist: &mut Vec<Rc<Path>>, new_path: Path) {
    let mut accept_new = true;
    let mut kept = Vec::with_capacity(pathlist.len() + 1);

    for old in pathlist.drain(..) {
        let mut remove_old = false;
        if accept_new {
            let total_cmp = compare_path_costs(&new_path, &old, CostCriterion::Total);
            let startup_cmp = compare_path_costs(&new_path, &old, CostCriterion::Startup);
            // paths that trade startup against total cost are both kept
            if total_cmp == Ordering::Equal || total_cmp == startup_cmp {
                match compare_pathkeys(&new_path.pathkeys, &old.pathkeys) {
                    PathKeysComparison::Equal => {
                        if total_cmp == Ordering::Less {
                            remove_old = true;
                        } else {
                            accept_new = false;
                        }
                    }
                    PathKeysComparison::Better1 => {
                        if total_cmp != Ordering::Greater {
                            remove_old = true;
                        }
                    }
                    PathKeysComparison::Better2 => {
                        if total_cmp != Ordering::Less {
                            accept_new = false;
                        }
                    }
                    PathKeysComparison::Different => {}
                }
            }
        }
        if !remove_old {
            kept.push(old);
        }
    }

    if accept_new {
        trace!(
            "Accepted path {} with cost {}..{}",
            new_path.operator,
            new_path.startup_cost,
            new_path.total_cost
        );
        kept.push(Rc::new(new_path));
    }
    *pathlist = kept;
}

pub fn cheapest_path(pathlist: &[Rc<Path>], criterion: CostCriterion) -> Option<&Rc<Path>> {
    pathlist
        .iter()
        .min_by(|a, b| compare_path_costs(a, b, criterion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;
    use crate::expr::Expr;
    use crate::operator::TableScan;
    use crate::properties::{PathKey, PathKeyItem};

    fn path(startup: f64, total: f64, pathkeys: PathKeys) -> Path {
        Path {
            parent: RelId::from(0),
            operator: TableScan::new(1).into(),
            rows: 1.0,
            startup_cost: Cost::from(startup),
            total_cost: Cost::from(total),
            pathkeys,
        }
    }

    fn sorted_by(attnos: &[i16]) -> PathKeys {
        attnos
            .iter()
            .map(|attno| {
                PathKey::singleton(PathKeyItem::new(Expr::var(1, *attno, DataType::Int4), 97))
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_compare_path_costs_breaks_ties() {
        let a = path(1.0, 10.0, PathKeys::none());
        let b = path(2.0, 10.0, PathKeys::none());
        assert_eq!(compare_path_costs(&a, &b, CostCriterion::Total), Ordering::Less);
        assert_eq!(compare_path_costs(&b, &a, CostCriterion::Startup), Ordering::Greater);
    }

    #[test]
    fn test_add_path_drops_dominated() {
        let mut pathlist = vec![];
        add_path(&mut pathlist, path(0.0, 20.0, PathKeys::none()));
        // cheaper and equally ordered
        add_path(&mut pathlist, path(0.0, 10.0, PathKeys::none()));
        assert_eq!(pathlist.len(), 1);
        assert_eq!(pathlist[0].total_cost.value(), 10.0);

        // dearer and no better ordered
        add_path(&mut pathlist, path(0.0, 15.0, PathKeys::none()));
        assert_eq!(pathlist.len(), 1);
    }

    #[test]
    fn test_add_path_keeps_useful_orderings() {
        let mut pathlist = vec![];
        add_path(&mut pathlist, path(0.0, 10.0, PathKeys::none()));
        // dearer, but sorted
        add_path(&mut pathlist, path(0.0, 15.0, sorted_by(&[1])));
        assert_eq!(pathlist.len(), 2);

        // as cheap as the unsorted path and better sorted than both
        add_path(&mut pathlist, path(0.0, 10.0, sorted_by(&[1, 2])));
        assert_eq!(pathlist.len(), 1);
        assert_eq!(pathlist[0].pathkeys.len(), 2);
    }

    #[test]
    fn test_add_path_keeps_startup_tradeoff() {
        let mut pathlist = vec![];
        add_path(&mut pathlist, path(0.0, 100.0, PathKeys::none()));
        add_path(&mut pathlist, path(50.0, 60.0, PathKeys::none()));
        assert_eq!(pathlist.len(), 2);
        assert_eq!(
            cheapest_path(&pathlist, CostCriterion::Startup)
                .unwrap()
                .startup_cost
                .value(),
            0.0
        );
        assert_eq!(
            cheapest_path(&pathlist, CostCriterion::Total)
                .unwrap()
                .total_cost
                .value(),
            60.0
        );
    }
}
