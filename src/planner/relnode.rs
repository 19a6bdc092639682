use std::rc::Rc;

use derive_more::{Display, From, Into};
use log::debug;

use crate::catalog::{IndexKey, IndexOptInfo};
use crate::error::{invalid_input, lookup_error, OptResult};
use crate::expr::{AttrNumber, Expr};
use crate::operator::JoinType;
use crate::planner::joininfo::{find_joininfo_node, get_actual_clauses, union_clauses};
use crate::planner::path::{cheapest_path, CostCriterion, Path};
use crate::planner::tlist::{new_join_tlist, TargetEntry};
use crate::planner::{JoinInfo, PlannerInfo, RestrictInfo};
use crate::relids::{Relids, RtIndex};
use crate::selectivity::clauselist_selectivity;

/// Position of a relation in the planner's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
pub struct RelId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelOptKind {
    BaseRel,
    JoinRel,
}

/// A base relation or a join of base relations, with its size estimate and the
/// candidate paths found for it.
#[derive(Clone, Debug)]
pub struct RelOptInfo {
    pub id: RelId,
    pub kind: RelOptKind,
    pub relids: Relids,
    /// Estimated output rows after restrictions.
    pub rows: f64,
    /// Estimated average output row width in bytes.
    pub width: i32,
    pub targetlist: Vec<TargetEntry>,
    pub pathlist: Vec<Rc<Path>>,

    // base relations only
    pub pages: f64,
    pub tuples: f64,
    pub indexed: bool,
    pub indexlist: Vec<IndexOptInfo>,
    pub baserestrictinfo: Vec<Rc<RestrictInfo>>,

    pub joininfo: Vec<JoinInfo>,
}

impl RelOptInfo {
    fn new(id: RelId, kind: RelOptKind, relids: Relids) -> Self {
        Self {
            id,
            kind,
            relids,
            rows: 0.0,
            width: 0,
            targetlist: vec![],
            pathlist: vec![],
            pages: 0.0,
            tuples: 0.0,
            indexed: false,
            indexlist: vec![],
            baserestrictinfo: vec![],
            joininfo: vec![],
        }
    }

    /// Range table index of a base relation.
    pub fn relid(&self) -> Option<RtIndex> {
        match self.kind {
            RelOptKind::BaseRel => self.relids.iter().next(),
            RelOptKind::JoinRel => None,
        }
    }

    /// Some non-partial unique index has exactly this column as its only key.
    pub fn has_unique_index(&self, attno: AttrNumber) -> bool {
        self.indexlist.iter().any(|index| {
            index.unique
                && !index.is_partial()
                && index.keys.len() == 1
                && index.keys[0] == IndexKey::Column(attno)
        })
    }

    pub fn cheapest_total_path(&self) -> Option<&Rc<Path>> {
        cheapest_path(&self.pathlist, CostCriterion::Total)
    }

    pub fn cheapest_startup_path(&self) -> Option<&Rc<Path>> {
        cheapest_path(&self.pathlist, CostCriterion::Startup)
    }

    /// Every join clause of this relation, each once.
    pub fn join_clauses(&self) -> Vec<Rc<RestrictInfo>> {
        let mut ret = vec![];
        for info in &self.joininfo {
            union_clauses(&mut ret, &info.clauses);
        }
        ret
    }
}

/// Never less than one row, rounded to a whole row.
pub fn clamp_row_est(nrows: f64) -> f64 {
    if nrows <= 1.0 {
        1.0
    } else {
        nrows.round()
    }
}

impl PlannerInfo {
    pub fn rel(&self, id: RelId) -> OptResult<&RelOptInfo> {
        self.rels
            .get(usize::from(id))
            .ok_or_else(|| lookup_error("relation info", id))
    }

    pub fn rel_mut(&mut self, id: RelId) -> OptResult<&mut RelOptInfo> {
        self.rels
            .get_mut(usize::from(id))
            .ok_or_else(|| lookup_error("relation info", id))
    }

    pub fn rels(&self) -> impl Iterator<Item = &RelOptInfo> {
        self.rels.iter()
    }

    /// The base relation of range table entry `relid`, built on first request.
    pub fn get_base_rel(&mut self, relid: RtIndex) -> OptResult<RelId> {
        if let Some(id) = self.base_rels.get(&relid) {
            return Ok(*id);
        }

        let rte = self.rte(relid)?.clone();
        let id = RelId(self.rels.len());
        let mut rel = RelOptInfo::new(id, RelOptKind::BaseRel, Relids::singleton(relid));
        match rte.relid {
            Some(relation) => {
                let size = self.catalog.relation_size(relation)?;
                rel.pages = size.pages;
                rel.tuples = size.tuples;
                rel.indexed = size.has_index;
                if size.has_index {
                    rel.indexlist = self.catalog.relation_indexes(relation)?;
                    for index in &mut rel.indexlist {
                        index.bind_to(relid);
                    }
                }
            }
            None => {
                rel.pages = self.context.cost.placeholder_pages;
                rel.tuples = self.context.cost.placeholder_tuples;
            }
        }
        debug!(
            "Built base relation {} ({}): {} pages, {} tuples, {} indexes",
            relid,
            rte.alias,
            rel.pages,
            rel.tuples,
            rel.indexlist.len()
        );

        self.rels.push(rel);
        self.base_rels.insert(relid, id);
        Ok(id)
    }

    pub fn find_base_rel(&self, relid: RtIndex) -> OptResult<&RelOptInfo> {
        let id = self
            .base_rels
            .get(&relid)
            .ok_or_else(|| lookup_error("base relation", relid))?;
        self.rel(*id)
    }

    pub fn find_join_rel(&self, relids: &Relids) -> Option<&RelOptInfo> {
        self.join_rels
            .iter()
            .filter_map(|id| self.rels.get(usize::from(*id)))
            .find(|rel| &rel.relids == relids)
    }

    /// The join relation of `outer` and `inner`, built on first request, together with
    /// the clauses that become applicable at this join.
    ///
    /// The restriction list depends on how the join relation is split into inputs, so it
    /// is recomputed on every call even when the relation already exists.
    pub fn get_join_rel(
        &mut self,
        outer: RelId,
        inner: RelId,
    ) -> OptResult<(RelId, Vec<Rc<RestrictInfo>>)> {
        let outer_rel = self.rel(outer)?;
        let inner_rel = self.rel(inner)?;
        if outer_rel.relids.overlaps(&inner_rel.relids) {
            return Err(invalid_input(format!(
                "can not join overlapping relations {} and {}",
                outer_rel.relids, inner_rel.relids
            )));
        }

        let joinrelids = outer_rel.relids.union(&inner_rel.relids);
        let restrictlist = build_joinrel_restrictlist(&joinrelids, outer_rel, inner_rel);

        if let Some(existing) = self.find_join_rel(&joinrelids) {
            return Ok((existing.id, restrictlist));
        }

        let id = RelId(self.rels.len());
        let mut joinrel = RelOptInfo::new(id, RelOptKind::JoinRel, joinrelids);
        joinrel.targetlist = new_join_tlist(&outer_rel.targetlist, 1);
        let next_resno = joinrel.targetlist.len() + 1;
        joinrel
            .targetlist
            .extend(new_join_tlist(&inner_rel.targetlist, next_resno));

        build_joinrel_joinlist(&mut joinrel, outer_rel);
        build_joinrel_joinlist(&mut joinrel, inner_rel);

        let selec = clauselist_selectivity(
            self,
            &get_actual_clauses(&restrictlist),
            None,
            JoinType::Inner,
        )?;
        joinrel.rows = clamp_row_est(outer_rel.rows * inner_rel.rows * selec);
        joinrel.width = outer_rel.width + inner_rel.width;

        debug!(
            "Built join relation {}: {} rows, {} restriction clauses",
            joinrel.relids,
            joinrel.rows,
            restrictlist.len()
        );

        self.rels.push(joinrel);
        self.join_rels.push(id);
        Ok((id, restrictlist))
    }

    /// Recomputes rows and width of a base relation from its restriction clauses.
    pub fn set_base_rel_size_estimates(&mut self, relid: RtIndex) -> OptResult<()> {
        let rel = self.find_base_rel(relid)?;
        let selec = clauselist_selectivity(
            self,
            &get_actual_clauses(&rel.baserestrictinfo),
            Some(relid),
            JoinType::Inner,
        )?;
        let rows = clamp_row_est(rel.tuples * selec);
        let width = self.rel_width(rel)?;

        let id = rel.id;
        let rel = self.rel_mut(id)?;
        rel.rows = rows;
        rel.width = width;
        Ok(())
    }

    fn rel_width(&self, rel: &RelOptInfo) -> OptResult<i32> {
        let relation = match rel.relid() {
            Some(relid) => self.rte(relid)?.relid,
            None => None,
        };
        let mut width = 0;
        for tle in &rel.targetlist {
            let stats_width = match (&tle.expr, relation) {
                (Expr::Var(v), Some(relation)) => self
                    .statistics()
                    .acquire_column(relation, v.varattno)
                    .map(|s| s.avg_width)
                    .filter(|w| *w > 0),
                _ => None,
            };
            width += stats_width.unwrap_or_else(|| tle.expr.expr_type().default_width());
        }
        Ok(width)
    }
}

/// Clauses of either input whose remaining relations are all inside the join.
fn build_joinrel_restrictlist(
    joinrelids: &Relids,
    outer_rel: &RelOptInfo,
    inner_rel: &RelOptInfo,
) -> Vec<Rc<RestrictInfo>> {
    let mut restrictlist = vec![];
    for rel in [outer_rel, inner_rel] {
        for info in &rel.joininfo {
            if info.unjoined_relids.is_subset(joinrelids) {
                union_clauses(&mut restrictlist, &info.clauses);
            }
        }
    }
    restrictlist
}

/// Carries over the clauses of `input` that still need relations outside the join.
fn build_joinrel_joinlist(joinrel: &mut RelOptInfo, input: &RelOptInfo) {
    for info in &input.joininfo {
        let unjoined = info.unjoined_relids.difference(&joinrel.relids);
        if !unjoined.is_empty() {
            let node = find_joininfo_node(&mut joinrel.joininfo, &unjoined);
            union_clauses(&mut node.clauses, &info.clauses);
        }
    }
}
