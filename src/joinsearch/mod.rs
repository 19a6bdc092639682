//! Bottom-up join search.
//!
//! Base relations get their scan paths first. Level `k` then holds every join relation
//! of `k` base relations, built by joining each relation of level `k - 1` with a base
//! relation not in it, preferring base relations linked to it by a join clause. Every
//! pair is tried both ways round and each join relation keeps the paths no other path
//! beats in both cost and ordering, so the result of the last level carries the best
//! plans for the whole query.

use std::rc::Rc;

use log::debug;

use crate::cost::{cost_sort, Cost};
use crate::error::{invalid_input, OptResult};
use crate::operator::JoinType;
use crate::planner::{CostCriterion, Path, PlannerInfo, RelId};
use crate::properties::{get_cheapest_path_for_pathkeys, PhysicalProp};

mod graph;
pub use graph::*;
mod paths;
pub use paths::*;

pub struct JoinSearch {
    graph: JoinGraph,
    levels: Vec<Vec<RelId>>,
}

impl JoinSearch {
    /// Builds the join graph and the scan paths of every base relation.
    pub fn new(root: &mut PlannerInfo) -> OptResult<Self> {
        let base_rels = root.base_rel_ids();
        if base_rels.is_empty() {
            return Err(invalid_input("nothing to join"));
        }
        for id in &base_rels {
            set_base_rel_pathlist(root, *id)?;
        }
        let graph = JoinGraph::build(root)?;
        debug!(
            "Join graph over {} relations with {} edges in {} components",
            graph.node_count(),
            graph.edge_count(),
            graph.components()
        );
        Ok(Self {
            graph,
            levels: vec![base_rels],
        })
    }

    /// Relations built so far; level `i` joins `i + 1` base relations.
    pub fn levels(&self) -> &[Vec<RelId>] {
        &self.levels
    }

    /// Runs all levels and returns the relation joining every base relation.
    pub fn search(mut self, root: &mut PlannerInfo) -> OptResult<RelId> {
        let base_rels = self.levels[0].clone();
        while self.levels.len() < base_rels.len() {
            let level = self.make_next_level(root, &base_rels)?;
            debug!(
                "Join level {} has {} relations",
                self.levels.len() + 1,
                level.len()
            );
            if level.is_empty() {
                return Err(invalid_input("join search produced an empty level"));
            }
            self.levels.push(level);
        }

        match self.levels.last().map(|level| level.as_slice()) {
            Some([rel]) => Ok(*rel),
            _ => Err(invalid_input("join search did not end in a single relation")),
        }
    }

    fn make_next_level(
        &self,
        root: &mut PlannerInfo,
        base_rels: &[RelId],
    ) -> OptResult<Vec<RelId>> {
        let mut next = vec![];
        let previous = self.levels.last().cloned().unwrap_or_default();

        for outer in &previous {
            let outer_relids = root.rel(*outer)?.relids.clone();
            // a relation without clauses to the rest joins anything
            let clauseless = !self.graph.has_outside_links(&outer_relids);
            for inner in base_rels {
                let inner_relids = root.rel(*inner)?.relids.clone();
                if outer_relids.overlaps(&inner_relids) {
                    continue;
                }
                if clauseless || self.graph.linked(&outer_relids, &inner_relids) {
                    make_join_rel(root, *outer, *inner, &mut next)?;
                }
            }
        }

        // disconnected components are joined by cartesian products
        if next.is_empty() {
            for outer in &previous {
                for inner in base_rels {
                    if !root.rel(*outer)?.relids.overlaps(&root.rel(*inner)?.relids) {
                        make_join_rel(root, *outer, *inner, &mut next)?;
                    }
                }
            }
        }
        Ok(next)
    }
}

/// Builds the join of `a` and `b` with paths for both input orders, recording a new
/// relation in `level`.
fn make_join_rel(
    root: &mut PlannerInfo,
    a: RelId,
    b: RelId,
    level: &mut Vec<RelId>,
) -> OptResult<RelId> {
    let (joinrel, restrictlist) = root.get_join_rel(a, b)?;
    add_paths_to_joinrel(root, joinrel, a, b, &restrictlist, JoinType::Inner)?;
    let (_, restrictlist) = root.get_join_rel(b, a)?;
    add_paths_to_joinrel(root, joinrel, b, a, &restrictlist, JoinType::Inner)?;
    if !level.contains(&joinrel) {
        level.push(joinrel);
    }
    Ok(joinrel)
}

/// Plans the whole query: the relation joining every base relation.
pub fn make_one_rel(root: &mut PlannerInfo) -> OptResult<RelId> {
    JoinSearch::new(root)?.search(root)
}

/// The path chosen for the query's final relation, and whether its output still has to
/// be sorted into the requested order.
#[derive(Clone, Debug)]
pub struct BestPath {
    pub path: Rc<Path>,
    pub explicit_sort: bool,
    pub total_cost: Cost,
}

/// Cheapest way to deliver `rel` in the query's requested order: a path already in that
/// order, or the cheapest path followed by a sort.
pub fn choose_best_path(root: &PlannerInfo, rel: RelId) -> OptResult<BestPath> {
    let rel = root.rel(rel)?;
    let cheapest = rel
        .cheapest_total_path()
        .ok_or_else(|| invalid_input(format!("no path for {}", rel.relids)))?;

    let query_pathkeys = root.query_pathkeys();
    if query_pathkeys.is_empty() || cheapest.pathkeys.satisfies(query_pathkeys) {
        return Ok(BestPath {
            path: cheapest.clone(),
            explicit_sort: false,
            total_cost: cheapest.total_cost,
        });
    }

    let sorted_cost = cost_sort(cheapest.total_cost, rel.rows, &root.context().cost).total;
    match get_cheapest_path_for_pathkeys(&rel.pathlist, query_pathkeys, CostCriterion::Total) {
        Some(presorted) if presorted.total_cost <= sorted_cost => Ok(BestPath {
            path: presorted.clone(),
            explicit_sort: false,
            total_cost: presorted.total_cost,
        }),
        _ => Ok(BestPath {
            path: cheapest.clone(),
            explicit_sort: true,
            total_cost: sorted_cost,
        }),
    }
}
