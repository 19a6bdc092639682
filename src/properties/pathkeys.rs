//! Sort orderings of paths.
//!
//! A [`PathKeys`] list describes the order of a path's output, most significant key
//! first. Every position is a [`PathKey`]: a set of `(expression, sort operator)` items
//! known to be equal at that position, so that after a merge join on `a = b` the output
//! is sorted by `a` and by `b` alike.

use std::fmt::{Display, Formatter};
use std::rc::Rc;

use derive_more::{Deref, From};
use itertools::Itertools;
use log::debug;

use crate::catalog::{IndexKey, IndexOptInfo, OperatorCatalog};
use crate::datum::Oid;
use crate::error::{invalid_input, OptResult};
use crate::expr::Expr;
use crate::planner::{
    compare_path_costs, tlist_member, CostCriterion, Path, RelOptInfo, RestrictInfo, SortClause,
    TargetEntry,
};
use crate::properties::PhysicalProp;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathKeyItem {
    pub key: Expr,
    pub sortop: Oid,
}

impl PathKeyItem {
    pub fn new(key: Expr, sortop: Oid) -> Self {
        Self { key, sortop }
    }
}

/// Interchangeable items of one sort position. Order inside is irrelevant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deref, From)]
pub struct PathKey(Vec<PathKeyItem>);

impl PathKey {
    pub fn singleton(item: PathKeyItem) -> Self {
        Self(vec![item])
    }

    pub fn is_subset(&self, other: &PathKey) -> bool {
        self.0.iter().all(|item| other.0.contains(item))
    }

    /// Adds `item` unless already present.
    pub fn add(&mut self, item: PathKeyItem) {
        if !self.0.contains(&item) {
            self.0.push(item);
        }
    }

    pub fn has_key(&self, key: &Expr) -> bool {
        self.0.iter().any(|item| &item.key == key)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deref, From)]
pub struct PathKeys(Vec<PathKey>);

impl PathKeys {
    pub fn new(keys: Vec<PathKey>) -> Self {
        Self(keys)
    }

    /// Unordered.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }
}

impl PhysicalProp for PathKeys {
    fn satisfies(&self, other: &Self) -> bool {
        pathkeys_contained_in(other, self)
    }
}

impl Display for PathKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.0
                .iter()
                .map(|key| key.iter().map(|item| &item.key).join("="))
                .join(", ")
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKeysComparison {
    Equal,
    /// The first list is strictly more ordered.
    Better1,
    /// The second list is strictly more ordered.
    Better2,
    Different,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Compares two orderings.
///
/// Position by position, each list's item set must be a subset of the other's for that
/// list to be implied by the other. A longer list can never be implied by a shorter one.
pub fn compare_pathkeys(keys1: &PathKeys, keys2: &PathKeys) -> PathKeysComparison {
    let mut key1_subset_of_key2 = true;
    let mut key2_subset_of_key1 = true;

    for (key1, key2) in keys1.iter().zip(keys2.iter()) {
        if key1_subset_of_key2 && !key1.is_subset(key2) {
            key1_subset_of_key2 = false;
        }
        if key2_subset_of_key1 && !key2.is_subset(key1) {
            key2_subset_of_key1 = false;
        }
        if !key1_subset_of_key2 && !key2_subset_of_key1 {
            return PathKeysComparison::Different;
        }
    }

    if keys1.len() > keys2.len() {
        key1_subset_of_key2 = false;
    }
    if keys2.len() > keys1.len() {
        key2_subset_of_key1 = false;
    }

    match (key1_subset_of_key2, key2_subset_of_key1) {
        (true, true) => PathKeysComparison::Equal,
        (true, false) => PathKeysComparison::Better2,
        (false, true) => PathKeysComparison::Better1,
        (false, false) => PathKeysComparison::Different,
    }
}

/// Whether an ordering `keys2` fulfills the required ordering `keys1`.
pub fn pathkeys_contained_in(keys1: &PathKeys, keys2: &PathKeys) -> bool {
    matches!(
        compare_pathkeys(keys1, keys2),
        PathKeysComparison::Equal | PathKeysComparison::Better2
    )
}

/// Cheapest path of `paths` by `criterion` among those ordered at least by `pathkeys`.
pub fn get_cheapest_path_for_pathkeys<'a>(
    paths: &'a [Rc<Path>],
    pathkeys: &PathKeys,
    criterion: CostCriterion,
) -> Option<&'a Rc<Path>> {
    paths
        .iter()
        .filter(|path| pathkeys_contained_in(pathkeys, &path.pathkeys))
        .min_by(|a, b| compare_path_costs(a, b, criterion))
}

/// Number of leading keys of `pathkeys` that help produce `query_pathkeys`: all of the
/// query's keys when the path already delivers them, otherwise none.
pub fn pathkeys_useful_for_ordering(query_pathkeys: &PathKeys, pathkeys: &PathKeys) -> usize {
    if query_pathkeys.is_empty() || pathkeys.is_empty() {
        return 0;
    }
    if pathkeys_contained_in(query_pathkeys, pathkeys) {
        query_pathkeys.len()
    } else {
        0
    }
}

/// The ordering a scan of `index` produces, as far as it can be expressed in terms of
/// the relation's output.
///
/// Keys are taken in order until one can not be found in the target list; a functional
/// key counts as found when all of its columns are. Unordered indexes give no ordering.
pub fn build_index_pathkeys(
    operators: &OperatorCatalog,
    rel: &RelOptInfo,
    index: &IndexOptInfo,
    direction: ScanDirection,
) -> PathKeys {
    let mut pathkeys = vec![];
    let relid = match rel.relid() {
        Some(relid) => relid,
        None => return PathKeys::none(),
    };

    for (key, sortop) in index.keys.iter().zip(&index.ordering) {
        let sortop = match direction {
            ScanDirection::Forward => Some(*sortop),
            ScanDirection::Backward => operators.commutator(*sortop),
        };
        let sortop = match sortop {
            Some(sortop) => sortop,
            None => break,
        };

        let expr = match key {
            IndexKey::Column(attno) => rel
                .targetlist
                .iter()
                .map(|tle| &tle.expr)
                .find(|expr| {
                    matches!(expr, Expr::Var(v) if v.varno == relid && v.varattno == *attno)
                })
                .cloned(),
            IndexKey::Expr(expr) => {
                let computable = expr.pull_vars().into_iter().all(|var| {
                    tlist_member(&Expr::Var(var), &rel.targetlist).is_some()
                });
                computable.then(|| expr.clone())
            }
        };
        match expr {
            Some(expr) => {
                let pathkey = PathKey::singleton(PathKeyItem::new(expr, sortop));
                // equal keys can repeat in an index, one position is enough
                if !pathkeys.contains(&pathkey) {
                    pathkeys.push(pathkey);
                }
            }
            None => break,
        }
    }

    PathKeys::new(pathkeys)
}

/// Ordering of a join's output when the outer input is ordered by `outer_pathkeys`.
///
/// Every outer position becomes a [`build_join_pathkey`]. Once a position keeps
/// nothing, the minor positions are dropped.
pub fn build_join_pathkeys(
    outer_pathkeys: &PathKeys,
    join_tlist: &[TargetEntry],
    restrictlist: &[Rc<RestrictInfo>],
) -> PathKeys {
    outer_pathkeys
        .iter()
        .map(|outer_key| build_join_pathkey(outer_key, join_tlist, restrictlist))
        .take_while(|key| !key.is_empty())
        .collect::<Vec<_>>()
        .into()
}

/// One position of a join's output ordering: the items of `outer_key` still visible in
/// the join's target list, plus the inner expressions a mergejoinable clause of
/// `restrictlist` equates with them.
pub fn build_join_pathkey(
    outer_key: &PathKey,
    join_tlist: &[TargetEntry],
    restrictlist: &[Rc<RestrictInfo>],
) -> PathKey {
    let mut key = PathKey::default();
    for item in outer_key.iter() {
        if tlist_member(&item.key, join_tlist).is_none() {
            continue;
        }
        key.add(item.clone());

        for rinfo in restrictlist {
            let mergejoin = match &rinfo.mergejoin {
                Some(mergejoin) => mergejoin,
                None => continue,
            };
            let (left, right) = match (rinfo.left_expr(), rinfo.right_expr()) {
                (Some(left), Some(right)) => (left, right),
                _ => continue,
            };
            let other = if left == &item.key {
                PathKeyItem::new(right.clone(), mergejoin.ops.right_sortop)
            } else if right == &item.key {
                PathKeyItem::new(left.clone(), mergejoin.ops.left_sortop)
            } else {
                continue;
            };
            if tlist_member(&other.key, join_tlist).is_some() {
                key.add(other);
            }
        }
    }
    key
}

/// One position per ORDER BY / GROUP BY item.
pub fn make_pathkeys_for_sortclauses(sortclauses: &[SortClause]) -> PathKeys {
    sortclauses
        .iter()
        .map(|clause| PathKey::singleton(PathKeyItem::new(clause.expr.clone(), clause.sortop)))
        .collect::<Vec<_>>()
        .into()
}

/// Ordering an input must have to be merge joined on `mergeclauses`, using the side of
/// each clause that `tlist` provides.
pub fn make_pathkeys_for_mergeclauses(
    mergeclauses: &[Rc<RestrictInfo>],
    tlist: &[TargetEntry],
) -> OptResult<PathKeys> {
    let mut pathkeys = vec![];
    for rinfo in mergeclauses {
        let mergejoin = rinfo
            .mergejoin
            .ok_or_else(|| invalid_input(format!("{} is not mergejoinable", rinfo.clause)))?;
        let left = rinfo.left_expr().filter(|e| tlist_member(e, tlist).is_some());
        let right = rinfo.right_expr().filter(|e| tlist_member(e, tlist).is_some());
        let item = match (left, right) {
            (Some(left), _) => PathKeyItem::new(left.clone(), mergejoin.ops.left_sortop),
            (None, Some(right)) => PathKeyItem::new(right.clone(), mergejoin.ops.right_sortop),
            (None, None) => {
                return Err(invalid_input(format!(
                    "neither side of {} is in the target list",
                    rinfo.clause
                )))
            }
        };
        let pathkey = PathKey::singleton(item);
        if !pathkeys.contains(&pathkey) {
            pathkeys.push(pathkey);
        }
    }
    Ok(PathKeys::new(pathkeys))
}

/// Merge clauses of `restrictinfos` usable with an input ordered by `pathkeys`, in
/// pathkey order.
///
/// Matching is greedy: each position takes the first unused clause with an operand
/// among its items, and the first position without one ends the list. A different
/// assignment might match more positions; the first one found is kept.
pub fn find_mergeclauses_for_pathkeys(
    pathkeys: &PathKeys,
    restrictinfos: &[Rc<RestrictInfo>],
) -> Vec<Rc<RestrictInfo>> {
    let mut mergeclauses: Vec<Rc<RestrictInfo>> = vec![];

    for pathkey in pathkeys.iter() {
        let matched = restrictinfos.iter().find(|rinfo| {
            let mergejoin = match &rinfo.mergejoin {
                Some(mergejoin) => mergejoin,
                None => return false,
            };
            if mergeclauses.iter().any(|used| Rc::ptr_eq(used, rinfo)) {
                return false;
            }
            let left = rinfo
                .left_expr()
                .map(|e| PathKeyItem::new(e.clone(), mergejoin.ops.left_sortop));
            let right = rinfo
                .right_expr()
                .map(|e| PathKeyItem::new(e.clone(), mergejoin.ops.right_sortop));
            left.map_or(false, |item| pathkey.contains(&item))
                || right.map_or(false, |item| pathkey.contains(&item))
        });
        match matched {
            Some(rinfo) => mergeclauses.push(rinfo.clone()),
            None => break,
        }
    }

    mergeclauses
}

/// The same ordering read backwards: every sort operator replaced by its commutator.
/// `None` when some operator has none.
pub fn commute_pathkeys(operators: &OperatorCatalog, pathkeys: &PathKeys) -> Option<PathKeys> {
    let mut commuted = vec![];
    for key in pathkeys.iter() {
        let mut items = vec![];
        for item in key.iter() {
            match operators.commutator(item.sortop) {
                Some(sortop) => items.push(PathKeyItem::new(item.key.clone(), sortop)),
                None => {
                    debug!("Sort operator {} of {} has no commutator", item.sortop, item.key);
                    return None;
                }
            }
        }
        commuted.push(PathKey::from(items));
    }
    Some(PathKeys::new(commuted))
}
