mod common;

use common::{op, Fixture, SHOP};
use relopt::catalog::{AccessMethod, IndexKey, IndexOptInfo};
use relopt::datum::{DataType, Oid};
use relopt::expr::Expr;
use relopt::planner::SortClause;
use relopt::properties::{
    build_index_pathkeys, build_join_pathkeys, compare_pathkeys, find_mergeclauses_for_pathkeys,
    make_pathkeys_for_sortclauses, pathkeys_contained_in, PathKeys, PathKeysComparison,
    ScanDirection,
};

fn sorted_by(exprs: &[Expr], sortop: Oid) -> PathKeys {
    make_pathkeys_for_sortclauses(
        &exprs
            .iter()
            .map(|expr| SortClause {
                expr: expr.clone(),
                sortop,
            })
            .collect::<Vec<_>>(),
    )
}

#[test]
fn test_longer_ordering_is_better() {
    let root = Fixture::load(SHOP).planner();
    let lt = op(&root, "<", DataType::Int4);
    let a = Expr::var(2, 3, DataType::Int4);
    let b = Expr::var(2, 4, DataType::Int4);

    let short = sorted_by(&[a.clone()], lt);
    let long = sorted_by(&[a, b], lt);
    assert_eq!(compare_pathkeys(&short, &long), PathKeysComparison::Better2);
    assert!(pathkeys_contained_in(&short, &long));
    assert!(!pathkeys_contained_in(&long, &short));
}

#[test]
fn test_index_ordering_ends_at_first_invisible_key() {
    let mut root = Fixture::load(SHOP).planner();
    let lt = op(&root, "<", DataType::Text);
    let name = Expr::var(1, 2, DataType::Text);
    root.add_target_expr(1, name.clone()).unwrap();

    let index = IndexOptInfo::new(
        101,
        AccessMethod::BTree,
        vec![IndexKey::Column(2), IndexKey::Column(3)],
    )
    .with_ordering(vec![lt, op(&root, "<", DataType::Int4)]);
    let rel = root.find_base_rel(1).unwrap();

    let pathkeys = build_index_pathkeys(root.operators(), rel, &index, ScanDirection::Forward);
    assert_eq!(pathkeys, sorted_by(&[name], lt));
}

#[test]
fn test_join_ordering_covers_both_sides() {
    let mut root = Fixture::load(SHOP).planner();
    let eq = op(&root, "=", DataType::Int4);
    let lt = op(&root, "<", DataType::Int4);
    let id = Expr::var(1, 1, DataType::Int4);
    let customer_id = Expr::var(2, 3, DataType::Int4);
    root.distribute_qual(Expr::op(eq, id.clone(), customer_id.clone()))
        .unwrap();

    let customers = root.find_base_rel(1).unwrap().id;
    let orders = root.find_base_rel(2).unwrap().id;
    let (joinrel, restrictlist) = root.get_join_rel(customers, orders).unwrap();
    let tlist = &root.rel(joinrel).unwrap().targetlist;

    let outer = sorted_by(&[id.clone()], lt);
    let joined = build_join_pathkeys(&outer, tlist, &restrictlist);
    assert_eq!(joined.len(), 1);
    assert!(joined[0].has_key(&id));
    assert!(joined[0].has_key(&customer_id));
    // ordered on the inner side alone is implied by the join output
    assert!(pathkeys_contained_in(&sorted_by(&[customer_id], lt), &joined));

    assert_eq!(find_mergeclauses_for_pathkeys(&outer, &restrictlist).len(), 1);
    let unrelated = sorted_by(&[Expr::var(1, 3, DataType::Int4)], lt);
    assert!(find_mergeclauses_for_pathkeys(&unrelated, &restrictlist).is_empty());
}
