use std::rc::Rc;

use log::{debug, warn};

use crate::error::{invalid_input, OptResult};
use crate::operator::{
    match_index_quals, HashJoin, IndexScan, Join, JoinType, MergeJoin, NestLoop,
    PhysicalOperator, TableScan,
};
use crate::planner::{
    add_path, CostCriterion, Path, PlannerInfo, RelId, RelOptInfo, RestrictInfo,
};
use crate::properties::{
    build_index_pathkeys, build_join_pathkeys, find_mergeclauses_for_pathkeys,
    get_cheapest_path_for_pathkeys, make_pathkeys_for_mergeclauses,
    pathkeys_useful_for_ordering, PathKeys, ScanDirection,
};

/// Adds the sequential scan of a base relation and every index scan worth having: one
/// that bounds the scan with some qual, or delivers an ordering.
pub fn set_base_rel_pathlist(root: &mut PlannerInfo, id: RelId) -> OptResult<()> {
    let mut paths = vec![];
    {
        let rel = root.rel(id)?;
        let relid = rel
            .relid()
            .ok_or_else(|| invalid_input(format!("{} is not a base relation", rel.relids)))?;

        paths.push(Path::new(
            root,
            rel,
            TableScan::new(relid).into(),
            PathKeys::none(),
        )?);

        for index in &rel.indexlist {
            let indexquals = match_index_quals(root, rel, index);
            let pathkeys =
                build_index_pathkeys(root.operators(), rel, index, ScanDirection::Forward);
            if !indexquals.is_empty() || !pathkeys.is_empty() {
                let scan = IndexScan::new(
                    relid,
                    index.clone(),
                    indexquals.clone(),
                    ScanDirection::Forward,
                );
                paths.push(Path::new(root, rel, scan.into(), pathkeys)?);
            }

            // scanning backwards only pays off for the requested ordering
            let backward =
                build_index_pathkeys(root.operators(), rel, index, ScanDirection::Backward);
            if pathkeys_useful_for_ordering(root.query_pathkeys(), &backward) > 0 {
                let scan = IndexScan::new(relid, index.clone(), indexquals, ScanDirection::Backward);
                paths.push(Path::new(root, rel, scan.into(), backward)?);
            }
        }
    }

    let rel = root.rel_mut(id)?;
    for path in paths {
        add_path(&mut rel.pathlist, path);
    }
    debug!(
        "Base relation {} keeps {} paths",
        rel.relids,
        rel.pathlist.len()
    );
    Ok(())
}

/// Clauses of `restrictlist` that can drive a join of `outer` and `inner`, one operand
/// from each side, and that `usable` accepts.
fn select_join_clauses(
    restrictlist: &[Rc<RestrictInfo>],
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    usable: impl Fn(&RestrictInfo) -> bool,
) -> Vec<Rc<RestrictInfo>> {
    restrictlist
        .iter()
        .filter(|rinfo| usable(rinfo) && rinfo.separates(&outer.relids, &inner.relids))
        .cloned()
        .collect()
}

/// Every join path for `joinrel` with `outer` as the outer input and `inner` as the
/// inner one.
pub fn add_paths_to_joinrel(
    root: &mut PlannerInfo,
    joinrel: RelId,
    outer: RelId,
    inner: RelId,
    restrictlist: &[Rc<RestrictInfo>],
    join_type: JoinType,
) -> OptResult<()> {
    let mut paths = vec![];
    {
        let joinrel = root.rel(joinrel)?;
        let outer = root.rel(outer)?;
        let inner = root.rel(inner)?;
        let (cheapest_outer, cheapest_inner) =
            match (outer.cheapest_total_path(), inner.cheapest_total_path()) {
                (Some(o), Some(i)) => (o.clone(), i.clone()),
                _ => {
                    warn!(
                        "Can not join {} and {}: an input has no path",
                        outer.relids, inner.relids
                    );
                    return Ok(());
                }
            };

        let mergeclause_list =
            select_join_clauses(restrictlist, outer, inner, RestrictInfo::is_mergejoinable);
        let hashclauses =
            select_join_clauses(restrictlist, outer, inner, |r| r.hashjoin_operator.is_some());

        let make_join = |outer_path: &Rc<Path>, inner_path: &Rc<Path>| {
            Join::new(
                join_type,
                outer_path.clone(),
                inner_path.clone(),
                restrictlist.to_vec(),
            )
        };

        // both inputs sorted explicitly
        if !mergeclause_list.is_empty() {
            let outerkeys = make_pathkeys_for_mergeclauses(&mergeclause_list, &outer.targetlist)?;
            let innerkeys = make_pathkeys_for_mergeclauses(&mergeclause_list, &inner.targetlist)?;
            let pathkeys = build_join_pathkeys(&outerkeys, &joinrel.targetlist, restrictlist);
            let merge = MergeJoin::new(
                make_join(&cheapest_outer, &cheapest_inner),
                mergeclause_list.clone(),
                outerkeys,
                innerkeys,
            );
            paths.push(Path::new(root, joinrel, merge.into(), pathkeys)?);
        }

        // each outer path in the order it comes in
        for outer_path in &outer.pathlist {
            let pathkeys =
                build_join_pathkeys(&outer_path.pathkeys, &joinrel.targetlist, restrictlist);

            let nestloop = NestLoop::new(make_join(outer_path, &cheapest_inner));
            paths.push(Path::new(root, joinrel, nestloop.into(), pathkeys.clone())?);

            let mergeclauses = find_mergeclauses_for_pathkeys(&outer_path.pathkeys, &mergeclause_list);
            if mergeclauses.is_empty() {
                continue;
            }
            let innersortkeys = make_pathkeys_for_mergeclauses(&mergeclauses, &inner.targetlist)?;
            let operator = match get_cheapest_path_for_pathkeys(
                &inner.pathlist,
                &innersortkeys,
                CostCriterion::Total,
            ) {
                Some(sorted_inner) => MergeJoin::new(
                    make_join(outer_path, sorted_inner),
                    mergeclauses,
                    PathKeys::none(),
                    PathKeys::none(),
                ),
                None => MergeJoin::new(
                    make_join(outer_path, &cheapest_inner),
                    mergeclauses,
                    PathKeys::none(),
                    innersortkeys,
                ),
            };
            paths.push(Path::new(root, joinrel, operator.into(), pathkeys)?);
        }

        if !hashclauses.is_empty() {
            let hash = HashJoin::new(make_join(&cheapest_outer, &cheapest_inner), hashclauses);
            paths.push(Path::new(root, joinrel, PhysicalOperator::from(hash), PathKeys::none())?);
        }
    }

    let joinrel = root.rel_mut(joinrel)?;
    for path in paths {
        add_path(&mut joinrel.pathlist, path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AccessMethod, IndexKey, IndexOptInfo, OperatorCatalog};
    use crate::datum::{DataType, Datum, Oid};
    use crate::expr::Expr;
    use crate::testing::{op, planner, TableDef};

    fn lt() -> Oid {
        OperatorCatalog::builtin()
            .find_operator("<", DataType::Int4, DataType::Int4)
            .unwrap()
    }

    fn btree(oid: Oid) -> IndexOptInfo {
        IndexOptInfo::new(oid, AccessMethod::BTree, vec![IndexKey::Column(1)])
            .with_ordering(vec![lt()])
            .with_size(30.0, 10000.0)
    }

    #[test]
    fn test_base_paths_keep_ordered_index_scan() {
        let mut root = planner(
            vec![TableDef::new(100, 100.0, 10000.0).with_index(btree(500))],
            vec![],
        );
        root.add_target_expr(1, Expr::var(1, 1, DataType::Int4)).unwrap();
        let id = root.find_base_rel(1).unwrap().id;
        set_base_rel_pathlist(&mut root, id).unwrap();

        let rel = root.find_base_rel(1).unwrap();
        // the seq scan is cheapest, the index scan is the only ordered path
        assert_eq!(rel.pathlist.len(), 2);
        let cheapest = rel.cheapest_total_path().unwrap();
        assert!(cheapest.operator.as_physical_table_scan().is_some());
        assert!(rel
            .pathlist
            .iter()
            .any(|p| p.operator.as_physical_index_scan().is_some() && p.pathkeys.len() == 1));
    }

    #[test]
    fn test_selective_index_scan_wins() {
        let mut root = planner(
            vec![TableDef::new(100, 100.0, 10000.0).with_index(btree(500))],
            vec![],
        );
        let eq = op(&root, "=", DataType::Int4);
        root.distribute_qual(Expr::op(
            eq,
            Expr::var(1, 1, DataType::Int4),
            Expr::constant(DataType::Int4, Datum::Int4(42)),
        ))
        .unwrap();
        root.set_base_rel_size_estimates(1).unwrap();
        let id = root.find_base_rel(1).unwrap().id;
        set_base_rel_pathlist(&mut root, id).unwrap();

        let rel = root.find_base_rel(1).unwrap();
        let cheapest = rel.cheapest_total_path().unwrap();
        let scan = cheapest.operator.as_physical_index_scan().unwrap();
        assert_eq!(scan.indexquals().len(), 1);
        assert_eq!(scan.direction(), ScanDirection::Forward);
    }

    #[test]
    fn test_join_paths() {
        let mut root = planner(
            vec![
                TableDef::new(100, 10.0, 1000.0),
                TableDef::new(200, 10.0, 1000.0),
            ],
            vec![],
        );
        let eq = op(&root, "=", DataType::Int4);
        root.distribute_qual(Expr::op(
            eq,
            Expr::var(1, 1, DataType::Int4),
            Expr::var(2, 1, DataType::Int4),
        ))
        .unwrap();
        let outer = root.find_base_rel(1).unwrap().id;
        let inner = root.find_base_rel(2).unwrap().id;
        set_base_rel_pathlist(&mut root, outer).unwrap();
        set_base_rel_pathlist(&mut root, inner).unwrap();

        let (joinrel, restrictlist) = root.get_join_rel(outer, inner).unwrap();
        add_paths_to_joinrel(&mut root, joinrel, outer, inner, &restrictlist, JoinType::Inner)
            .unwrap();

        let joinrel = root.rel(joinrel).unwrap();
        assert_eq!(joinrel.rows, 5000.0);
        // sorting both sides beats probing 100-tuple buckets
        let cheapest = joinrel.cheapest_total_path().unwrap();
        let merge = cheapest.operator.as_physical_merge_join().unwrap();
        assert_eq!(merge.outersortkeys().len(), 1);
        // ordered by both join columns at once
        assert_eq!(cheapest.pathkeys.len(), 1);
        assert_eq!(cheapest.pathkeys[0].len(), 2);

        let first_row = joinrel.cheapest_startup_path().unwrap();
        assert!(first_row.operator.as_physical_nest_loop().is_some());
        // the hash join trades between the two
        assert_eq!(joinrel.pathlist.len(), 3);
        assert!(joinrel
            .pathlist
            .iter()
            .any(|p| p.operator.as_physical_hash_join().is_some()));
    }
}
