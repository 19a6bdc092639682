use std::fmt::{Display, Formatter};
use std::rc::Rc;

use enumset::{enum_set, EnumSet, EnumSetType};
use log::trace;
use strum_macros::Display as StrumDisplay;

use crate::cost::{cost_qual_eval, cost_sort, PathCost};
use crate::error::{invalid_input, OptResult};
use crate::operator::PhysicalOperatorTrait;
use crate::planner::{get_actual_clauses, Path, PlannerInfo, RelOptInfo, RestrictInfo};
use crate::properties::PathKeys;
use crate::relids::Relids;
use crate::selectivity::{
    clauselist_selectivity, estimate_hash_bucketsize, mergejoinscansel, Selectivity,
};

/// Tuples a hash bucket is sized for.
const NTUP_PER_BUCKET: f64 = 10.0;

#[derive(EnumSetType, Debug, Hash, StrumDisplay)]
pub enum JoinType {
    Inner,
    Left,
    Full,
    Right,
    /// Semi join: each outer row at most once, if it has a match.
    In,
    /// Semi join with the roles of the inputs swapped.
    ReverseIn,
    /// Inner join after removing duplicates from the outer input.
    UniqueOuter,
    /// Inner join after removing duplicates from the inner input.
    UniqueInner,
}

/// Joins that see each distinct inner value once per outer row. The unique side of an
/// IN clause is always its right operand, whichever input it ends up as.
pub const DEDUP_INNER_JOINS: EnumSet<JoinType> = enum_set!(
    JoinType::In | JoinType::ReverseIn | JoinType::UniqueOuter | JoinType::UniqueInner
);

impl JoinType {
    pub fn dedups_inner(&self) -> bool {
        DEDUP_INNER_JOINS.contains(*self)
    }
}

/// Inputs shared by all join methods.
#[derive(Clone, Debug)]
pub struct Join {
    join_type: JoinType,
    outer: Rc<Path>,
    inner: Rc<Path>,
    restrictlist: Vec<Rc<RestrictInfo>>,
}

impl Join {
    pub fn new(
        join_type: JoinType,
        outer: Rc<Path>,
        inner: Rc<Path>,
        restrictlist: Vec<Rc<RestrictInfo>>,
    ) -> Self {
        Self {
            join_type,
            outer,
            inner,
            restrictlist,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn outer(&self) -> &Rc<Path> {
        &self.outer
    }

    pub fn inner(&self) -> &Rc<Path> {
        &self.inner
    }

    pub fn restrictlist(&self) -> &[Rc<RestrictInfo>] {
        &self.restrictlist
    }

    /// Restriction clauses not among `handled`, by identity.
    fn other_clauses(&self, handled: &[Rc<RestrictInfo>]) -> Vec<Rc<RestrictInfo>> {
        self.restrictlist
            .iter()
            .filter(|r| !handled.iter().any(|h| Rc::ptr_eq(h, r)))
            .cloned()
            .collect()
    }

    /// Rows expected to satisfy `clauses`, before any other clause is checked.
    fn tuples_passing(&self, root: &PlannerInfo, clauses: &[Rc<RestrictInfo>]) -> OptResult<f64> {
        let selec = clauselist_selectivity(
            root,
            &get_actual_clauses(clauses),
            None,
            self.join_type,
        )?;
        Ok(self.outer.rows * self.inner.rows * selec)
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.join_type, self.outer.operator, self.inner.operator
        )
    }
}

/// Rescans the inner input once per outer row.
#[derive(Clone, Debug)]
pub struct NestLoop {
    join: Join,
}

impl NestLoop {
    pub fn new(join: Join) -> Self {
        Self { join }
    }

    pub fn join(&self) -> &Join {
        &self.join
    }
}

impl PhysicalOperatorTrait for NestLoop {
    fn cost(&self, root: &PlannerInfo, _rel: &RelOptInfo) -> OptResult<PathCost> {
        let params = &root.context().cost;
        let outer = &self.join.outer;
        let inner = &self.join.inner;

        let mut startup = (outer.startup_cost + inner.startup_cost).value();
        let mut run = (outer.total_cost - outer.startup_cost).value();
        run += outer.rows * (inner.total_cost - inner.startup_cost).value();
        // the first inner scan is already paid for in startup
        if outer.rows > 1.0 {
            run += (outer.rows - 1.0) * inner.startup_cost.value();
        }

        let qual_cost = cost_qual_eval(self.join.restrictlist.iter().map(|r| &r.clause), params);
        startup += qual_cost.startup;
        run += (params.cpu_tuple_cost + qual_cost.per_tuple) * outer.rows * inner.rows;

        Ok(PathCost::new(startup, startup + run))
    }
}

/// Walks both inputs in the order of `mergeclauses`, sorting an input first when its
/// sort keys are given.
#[derive(Clone, Debug)]
pub struct MergeJoin {
    join: Join,
    mergeclauses: Vec<Rc<RestrictInfo>>,
    outersortkeys: PathKeys,
    innersortkeys: PathKeys,
}

impl MergeJoin {
    pub fn new(
        join: Join,
        mergeclauses: Vec<Rc<RestrictInfo>>,
        outersortkeys: PathKeys,
        innersortkeys: PathKeys,
    ) -> Self {
        Self {
            join,
            mergeclauses,
            outersortkeys,
            innersortkeys,
        }
    }

    pub fn join(&self) -> &Join {
        &self.join
    }

    pub fn mergeclauses(&self) -> &[Rc<RestrictInfo>] {
        &self.mergeclauses
    }

    pub fn outersortkeys(&self) -> &PathKeys {
        &self.outersortkeys
    }

    pub fn innersortkeys(&self) -> &PathKeys {
        &self.innersortkeys
    }
}

/// Startup and run cost of reading `scansel` of an input, sorted first if `sortkeys` is
/// not empty. A sort pays in full before the first row.
fn merge_input_cost(
    root: &PlannerInfo,
    input: &Path,
    sortkeys: &PathKeys,
    scansel: Selectivity,
) -> (f64, f64) {
    let params = &root.context().cost;
    if sortkeys.is_empty() {
        let run = (input.total_cost - input.startup_cost).value() * scansel;
        (input.startup_cost.value(), run)
    } else {
        let sort = cost_sort(input.total_cost, input.rows, params);
        let run = (sort.total - sort.startup).value() * scansel;
        (sort.startup.value(), run)
    }
}

fn path_relids(root: &PlannerInfo, path: &Path) -> OptResult<Relids> {
    Ok(root.rel(path.parent)?.relids.clone())
}

impl PhysicalOperatorTrait for MergeJoin {
    /// The merge stops once either input runs past the other's last key, so only the
    /// scanned fraction of each input is paid for.
    fn cost(&self, root: &PlannerInfo, _rel: &RelOptInfo) -> OptResult<PathCost> {
        let params = &root.context().cost;
        let outer = &self.join.outer;
        let inner = &self.join.inner;

        let first = self
            .mergeclauses
            .first()
            .ok_or_else(|| invalid_input("merge join without merge clauses"))?;
        let scan = mergejoinscansel(root, &first.clause)?;
        let (outerscansel, innerscansel) =
            if first.left_relids.is_subset(&path_relids(root, outer)?) {
                (scan.left, scan.right)
            } else {
                (scan.right, scan.left)
            };

        let (outer_startup, outer_run) =
            merge_input_cost(root, outer, &self.outersortkeys, outerscansel);
        let (inner_startup, inner_run) =
            merge_input_cost(root, inner, &self.innersortkeys, innerscansel);
        let mut startup = outer_startup + inner_startup;
        let mut run = outer_run + inner_run;

        // one merge qual evaluation per tuple read from either side
        let merge_qual_cost = cost_qual_eval(self.mergeclauses.iter().map(|r| &r.clause), params);
        startup += merge_qual_cost.startup;
        run += merge_qual_cost.per_tuple
            * (outer.rows * outerscansel + inner.rows * innerscansel);

        let other_clauses = self.join.other_clauses(&self.mergeclauses);
        let qp_qual_cost = cost_qual_eval(other_clauses.iter().map(|r| &r.clause), params);
        let mergejointuples = self.join.tuples_passing(root, &self.mergeclauses)?;
        startup += qp_qual_cost.startup;
        run += (params.cpu_tuple_cost + qp_qual_cost.per_tuple) * mergejointuples;

        trace!(
            "Merge join scans {} of outer and {} of inner, {} matches",
            outerscansel,
            innerscansel,
            mergejointuples
        );
        Ok(PathCost::new(startup, startup + run))
    }
}

/// Builds a hash table on the inner input, then probes it with each outer row.
#[derive(Clone, Debug)]
pub struct HashJoin {
    join: Join,
    hashclauses: Vec<Rc<RestrictInfo>>,
}

impl HashJoin {
    pub fn new(join: Join, hashclauses: Vec<Rc<RestrictInfo>>) -> Self {
        Self { join, hashclauses }
    }

    pub fn join(&self) -> &Join {
        &self.join
    }

    pub fn hashclauses(&self) -> &[Rc<RestrictInfo>] {
        &self.hashclauses
    }
}

impl PhysicalOperatorTrait for HashJoin {
    fn cost(&self, root: &PlannerInfo, _rel: &RelOptInfo) -> OptResult<PathCost> {
        let params = &root.context().cost;
        let outer = &self.join.outer;
        let inner = &self.join.inner;

        // the inner input is consumed completely before the first probe
        let mut startup = outer.startup_cost.value() + inner.total_cost.value();
        let mut run = (outer.total_cost - outer.startup_cost).value();

        // hash function once per input tuple
        startup += params.cpu_operator_cost * inner.rows;
        run += params.cpu_operator_cost * outer.rows;

        let nbuckets = (inner.rows / NTUP_PER_BUCKET).ceil().max(1.0) as usize;
        let inner_relids = path_relids(root, inner)?;
        let mut innerbucketsize: Selectivity = 1.0;
        for rinfo in &self.hashclauses {
            let hashkey = if rinfo.left_relids.is_subset(&inner_relids) {
                rinfo.left_expr()
            } else {
                rinfo.right_expr()
            };
            let hashkey = hashkey
                .ok_or_else(|| invalid_input(format!("{} is not hashable", rinfo.clause)))?;
            innerbucketsize =
                innerbucketsize.min(estimate_hash_bucketsize(root, hashkey, nbuckets)?);
        }

        // every outer tuple is compared with the tuples of one bucket
        run += params.cpu_operator_cost * outer.rows * (inner.rows * innerbucketsize).ceil();

        let other_clauses = self.join.other_clauses(&self.hashclauses);
        let qp_qual_cost = cost_qual_eval(other_clauses.iter().map(|r| &r.clause), params);
        let hashjointuples = self.join.tuples_passing(root, &self.hashclauses)?;
        startup += qp_qual_cost.startup;
        run += (params.cpu_tuple_cost + qp_qual_cost.per_tuple) * hashjointuples;

        trace!(
            "Hash join with {} buckets, bucket size {}, {} matches",
            nbuckets,
            innerbucketsize,
            hashjointuples
        );
        Ok(PathCost::new(startup, startup + run))
    }
}
