use log::trace;

use crate::catalog::{AccessMethod, IndexKey, IndexOptInfo, RestrictEstimator};
use crate::cost::{cost_qual_eval, estimate_index_cost, PathCost};
use crate::error::{invalid_input, OptResult};
use crate::expr::Expr;
use crate::operator::PhysicalOperatorTrait;
use crate::planner::{clamp_row_est, PlannerInfo, RelOptInfo};
use crate::properties::ScanDirection;
use crate::relids::RtIndex;

/// Sequential scan of a base relation, filtering by its restriction clauses.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableScan {
    relid: RtIndex,
}

impl TableScan {
    pub fn new(relid: RtIndex) -> Self {
        Self { relid }
    }

    pub fn relid(&self) -> RtIndex {
        self.relid
    }
}

impl PhysicalOperatorTrait for TableScan {
    fn cost(&self, root: &PlannerInfo, rel: &RelOptInfo) -> OptResult<PathCost> {
        if rel.relid() != Some(self.relid) {
            return Err(invalid_input(format!(
                "sequential scan of {} can not produce {}",
                self.relid, rel.relids
            )));
        }
        let params = &root.context().cost;
        let qual_cost = cost_qual_eval(rel.baserestrictinfo.iter().map(|r| &r.clause), params);

        let startup = qual_cost.startup;
        let run = params.seq_page_cost * rel.pages
            + (params.cpu_tuple_cost + qual_cost.per_tuple) * rel.tuples;
        Ok(PathCost::new(startup, startup + run))
    }
}

/// Scan of a base relation through one of its indexes. `indexquals` bound the part of
/// the index visited; other restriction clauses are checked on the fetched tuples.
#[derive(Clone, Debug)]
pub struct IndexScan {
    relid: RtIndex,
    index: IndexOptInfo,
    indexquals: Vec<Expr>,
    direction: ScanDirection,
}

impl IndexScan {
    pub fn new(
        relid: RtIndex,
        index: IndexOptInfo,
        indexquals: Vec<Expr>,
        direction: ScanDirection,
    ) -> Self {
        Self {
            relid,
            index,
            indexquals,
            direction,
        }
    }

    pub fn relid(&self) -> RtIndex {
        self.relid
    }

    pub fn index(&self) -> &IndexOptInfo {
        &self.index
    }

    pub fn indexquals(&self) -> &[Expr] {
        &self.indexquals
    }

    pub fn direction(&self) -> ScanDirection {
        self.direction
    }
}

impl PhysicalOperatorTrait for IndexScan {
    /// Index access plus heap access. Heap pages are fetched at random for an index
    /// uncorrelated with the heap and sequentially for a perfectly correlated one; the
    /// squared correlation interpolates between the two.
    fn cost(&self, root: &PlannerInfo, rel: &RelOptInfo) -> OptResult<PathCost> {
        if rel.relid() != Some(self.relid) {
            return Err(invalid_input(format!(
                "index scan of {} can not produce {}",
                self.relid, rel.relids
            )));
        }
        let params = &root.context().cost;
        let index_cost = estimate_index_cost(root, rel, &self.index, &self.indexquals)?;

        let mut startup = index_cost.startup.value();
        let mut run = index_cost.total.value() - startup;

        let tuples_fetched = clamp_row_est(index_cost.selectivity * rel.tuples);
        let heap_pages = rel.pages.max(1.0);

        // Mackert and Lohman, with the whole table in cache
        let pages_fetched = (2.0 * heap_pages * tuples_fetched
            / (2.0 * heap_pages + tuples_fetched))
            .min(heap_pages)
            .ceil();
        let max_io = pages_fetched * params.random_page_cost;
        let min_io = (index_cost.selectivity * heap_pages).ceil() * params.seq_page_cost;
        let csquared = index_cost.correlation * index_cost.correlation;
        run += max_io + csquared * (min_io - max_io);

        let qual_cost = cost_qual_eval(
            rel.baserestrictinfo
                .iter()
                .map(|r| &r.clause)
                .filter(|clause| !self.indexquals.contains(clause)),
            params,
        );
        startup += qual_cost.startup;
        run += (params.cpu_tuple_cost + qual_cost.per_tuple) * tuples_fetched;

        trace!(
            "Index scan of {} using {}: {} tuples on {} pages, correlation {}",
            self.relid,
            self.index.oid,
            tuples_fetched,
            pages_fetched,
            index_cost.correlation
        );
        Ok(PathCost::new(startup, startup + run))
    }
}

/// Whether `expr` is the value of index column `key` for base relation `relid`.
fn match_index_key(key: &IndexKey, relid: RtIndex, expr: &Expr) -> bool {
    match (key, expr.strip_relabel()) {
        (IndexKey::Column(attno), Expr::Var(v)) => v.varno == relid && v.varattno == *attno,
        (IndexKey::Expr(key), expr) => key == expr,
        _ => false,
    }
}

/// Restriction clauses of `rel` that `index` can use to bound its scan: an operator
/// the access method supports, comparing an index column with a value fixed for the
/// scan.
pub fn match_index_quals(root: &PlannerInfo, rel: &RelOptInfo, index: &IndexOptInfo) -> Vec<Expr> {
    let relid = match rel.relid() {
        Some(relid) => relid,
        None => return vec![],
    };

    rel.baserestrictinfo
        .iter()
        .map(|rinfo| &rinfo.clause)
        .filter(|clause| {
            let (opno, left, right) = match clause.binary_args() {
                Some(args) => args,
                None => return false,
            };
            let supported = match root.operators().get(opno).and_then(|info| info.restrict) {
                Some(RestrictEstimator::Eq) => {
                    matches!(index.am, AccessMethod::BTree | AccessMethod::Hash)
                }
                Some(RestrictEstimator::ScalarLt) | Some(RestrictEstimator::ScalarGt) => {
                    index.am == AccessMethod::BTree
                }
                _ => false,
            };
            supported
                && index.keys.iter().any(|key| {
                    (match_index_key(key, relid, left) && right.is_pseudo_constant())
                        || (match_index_key(key, relid, right) && left.is_pseudo_constant())
                })
        })
        .cloned()
        .collect()
}
