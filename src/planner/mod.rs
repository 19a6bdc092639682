//! Planning session state: the range table, the relations built for it and the clauses
//! distributed over them.

use std::collections::HashMap;
use std::rc::Rc;

use itertools::Itertools;
use log::debug;
use prettytable::Table;

use crate::catalog::{
    OperatorCatalog, RangeTblEntry, RelationCatalog, StatisticsCache, StatisticsProvider,
};
use crate::error::{lookup_error, OptResult};
use crate::expr::Expr;
use crate::optimizer::OptimizerContext;
use crate::properties::PathKeys;
use crate::relids::{Membership, Relids, RtIndex};

mod joininfo;
pub use joininfo::*;
mod path;
pub use path::*;
mod relnode;
pub use relnode::*;
mod tlist;
pub use tlist::*;

/// Everything one planning attempt knows. Estimators borrow it immutably; only the
/// relation builders mutate it.
pub struct PlannerInfo {
    context: OptimizerContext,
    operators: OperatorCatalog,
    catalog: Rc<dyn RelationCatalog>,
    statistics: StatisticsCache,
    /// Entry `i` is range table index `i + 1`.
    range_table: Vec<RangeTblEntry>,
    rels: Vec<RelOptInfo>,
    base_rels: HashMap<RtIndex, RelId>,
    join_rels: Vec<RelId>,
    /// Clauses without any Var, checked once per execution.
    constant_quals: Vec<Rc<RestrictInfo>>,
    /// Ordering the final result should have.
    query_pathkeys: PathKeys,
}

impl PlannerInfo {
    pub fn new(
        context: OptimizerContext,
        catalog: Rc<dyn RelationCatalog>,
        statistics: Rc<dyn StatisticsProvider>,
        range_table: Vec<RangeTblEntry>,
    ) -> Self {
        Self {
            context,
            operators: OperatorCatalog::builtin(),
            catalog,
            statistics: StatisticsCache::new(statistics),
            range_table,
            rels: vec![],
            base_rels: HashMap::new(),
            join_rels: vec![],
            constant_quals: vec![],
            query_pathkeys: PathKeys::none(),
        }
    }

    /// Replaces the builtin operator set.
    pub fn with_operators(mut self, operators: OperatorCatalog) -> Self {
        self.operators = operators;
        self
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    pub fn operators(&self) -> &OperatorCatalog {
        &self.operators
    }

    pub fn statistics(&self) -> &StatisticsCache {
        &self.statistics
    }

    pub fn rte(&self, relid: RtIndex) -> OptResult<&RangeTblEntry> {
        relid
            .checked_sub(1)
            .and_then(|i| self.range_table.get(i))
            .ok_or_else(|| lookup_error("range table entry", relid))
    }

    pub fn range_table_len(&self) -> usize {
        self.range_table.len()
    }

    pub fn base_rel_ids(&self) -> Vec<RelId> {
        self.base_rels.values().copied().sorted().collect()
    }

    pub fn join_rel_ids(&self) -> &[RelId] {
        &self.join_rels
    }

    pub fn constant_quals(&self) -> &[Rc<RestrictInfo>] {
        &self.constant_quals
    }

    pub fn query_pathkeys(&self) -> &PathKeys {
        &self.query_pathkeys
    }

    /// Requests an output ordering, typically from
    /// [`make_pathkeys_for_sortclauses`](crate::properties::make_pathkeys_for_sortclauses).
    pub fn set_query_pathkeys(&mut self, pathkeys: PathKeys) {
        self.query_pathkeys = pathkeys;
    }

    /// Attaches a WHERE clause to the relations it references: a restriction of one base
    /// relation, a join clause waiting for the others, or a constant qual.
    pub fn distribute_qual(&mut self, clause: Expr) -> OptResult<Rc<RestrictInfo>> {
        let rinfo = RestrictInfo::new(clause, &self.operators);
        let relids = rinfo.required_relids.clone();

        match relids.membership() {
            Membership::Empty => self.constant_quals.push(rinfo.clone()),
            Membership::Singleton(relid) => {
                let id = self.get_base_rel(relid)?;
                self.rel_mut(id)?.baserestrictinfo.push(rinfo.clone());
            }
            Membership::Multiple => {
                for relid in relids.iter() {
                    let id = self.get_base_rel(relid)?;
                    let unjoined = relids.difference(&Relids::singleton(relid));
                    let rel = self.rel_mut(id)?;
                    find_joininfo_node(&mut rel.joininfo, &unjoined)
                        .clauses
                        .push(rinfo.clone());
                }
                // join clauses need their operands available above the scans
                for var in rinfo.clause.pull_vars() {
                    self.add_target_expr(var.varno, Expr::Var(var))?;
                }
            }
        }
        debug!("Distributed clause {} to {}", rinfo.clause, relids);
        Ok(rinfo)
    }

    /// Adds `expr` to the output of base relation `relid`, once.
    pub fn add_target_expr(&mut self, relid: RtIndex, expr: Expr) -> OptResult<()> {
        let id = self.get_base_rel(relid)?;
        let rel = self.rel_mut(id)?;
        if tlist_member(&expr, &rel.targetlist).is_none() {
            let resno = rel.targetlist.len() + 1;
            rel.targetlist.push(TargetEntry { resno, expr });
        }
        Ok(())
    }

    /// One row per relation: relids, size, width and the cheapest paths.
    pub fn explain_table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row!["relids", "rows", "width", "paths", "cheapest total", "pathkeys"]);
        for rel in &self.rels {
            let (cheapest, pathkeys) = match rel.cheapest_total_path() {
                Some(path) => (
                    format!(
                        "{} ({}..{})",
                        path.operator, path.startup_cost, path.total_cost
                    ),
                    path.pathkeys.to_string(),
                ),
                None => ("-".to_string(), "-".to_string()),
            };
            table.add_row(row![
                rel.relids,
                rel.rows,
                rel.width,
                rel.pathlist.len(),
                cheapest,
                pathkeys
            ]);
        }
        table
    }
}
