use std::rc::Rc;

use crate::catalog::{MergeJoinOps, OperatorCatalog};
use crate::datum::Oid;
use crate::expr::Expr;
use crate::relids::Relids;

/// Merge join details of a clause `left op right`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeJoinInfo {
    pub opno: Oid,
    pub ops: MergeJoinOps,
}

/// A qualification clause plus what the planner derived from it. Shared between the
/// relations that reference it; identity is the `Rc` pointer.
#[derive(Debug)]
pub struct RestrictInfo {
    pub clause: Expr,
    pub required_relids: Relids,
    pub left_relids: Relids,
    pub right_relids: Relids,
    pub mergejoin: Option<MergeJoinInfo>,
    pub hashjoin_operator: Option<Oid>,
}

impl RestrictInfo {
    pub fn new(clause: Expr, operators: &OperatorCatalog) -> Rc<Self> {
        let required_relids = clause.varnos();
        let mut rinfo = RestrictInfo {
            clause,
            required_relids,
            left_relids: Relids::new(),
            right_relids: Relids::new(),
            mergejoin: None,
            hashjoin_operator: None,
        };

        if let Some((opno, left, right)) = rinfo.clause.binary_args() {
            let left_relids = left.varnos();
            let right_relids = right.varnos();
            // join clause shape: each side from a different, non-empty relid set
            if !left_relids.is_empty()
                && !right_relids.is_empty()
                && !left_relids.overlaps(&right_relids)
            {
                if let Some(info) = operators.get(opno) {
                    rinfo.mergejoin = info.mergejoin.map(|ops| MergeJoinInfo { opno, ops });
                    if info.hashjoinable {
                        rinfo.hashjoin_operator = Some(opno);
                    }
                }
            }
            rinfo.left_relids = left_relids;
            rinfo.right_relids = right_relids;
        }

        Rc::new(rinfo)
    }

    pub fn is_mergejoinable(&self) -> bool {
        self.mergejoin.is_some()
    }

    pub fn left_expr(&self) -> Option<&Expr> {
        self.clause.binary_args().map(|(_, l, _)| l)
    }

    pub fn right_expr(&self) -> Option<&Expr> {
        self.clause.binary_args().map(|(_, _, r)| r)
    }

    /// Whether the clause can drive a join of `outer` and `inner`: one operand entirely
    /// from each side.
    pub fn separates(&self, outer: &Relids, inner: &Relids) -> bool {
        (self.left_relids.is_subset(outer) && self.right_relids.is_subset(inner))
            || (self.left_relids.is_subset(inner) && self.right_relids.is_subset(outer))
    }
}

/// Clauses of a relation that can only be applied once `unjoined_relids` have been
/// joined in.
#[derive(Clone, Debug, Default)]
pub struct JoinInfo {
    pub unjoined_relids: Relids,
    pub clauses: Vec<Rc<RestrictInfo>>,
}

/// The JoinInfo of `joininfo` keyed by `relids`, created if missing.
pub fn find_joininfo_node<'a>(joininfo: &'a mut Vec<JoinInfo>, relids: &Relids) -> &'a mut JoinInfo {
    let pos = match joininfo.iter().position(|j| &j.unjoined_relids == relids) {
        Some(pos) => pos,
        None => {
            joininfo.push(JoinInfo {
                unjoined_relids: relids.clone(),
                clauses: vec![],
            });
            joininfo.len() - 1
        }
    };
    &mut joininfo[pos]
}

/// Appends the clauses of `from` not already present, by identity.
pub fn union_clauses(into: &mut Vec<Rc<RestrictInfo>>, from: &[Rc<RestrictInfo>]) {
    for rinfo in from {
        if !into.iter().any(|r| Rc::ptr_eq(r, rinfo)) {
            into.push(rinfo.clone());
        }
    }
}

pub fn get_actual_clauses(rinfos: &[Rc<RestrictInfo>]) -> Vec<Expr> {
    rinfos.iter().map(|r| r.clause.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;

    #[test]
    fn test_mergejoinable_clause() {
        let operators = OperatorCatalog::builtin();
        let eq = operators
            .find_operator("=", DataType::Int4, DataType::Int4)
            .unwrap();
        let join = RestrictInfo::new(
            Expr::op(eq, Expr::var(1, 1, DataType::Int4), Expr::var(2, 1, DataType::Int4)),
            &operators,
        );
        assert!(join.is_mergejoinable());
        assert_eq!(join.hashjoin_operator, Some(eq));
        assert!(join.separates(&Relids::singleton(2), &Relids::singleton(1)));

        let restriction = RestrictInfo::new(
            Expr::op(
                eq,
                Expr::var(1, 1, DataType::Int4),
                Expr::var(1, 2, DataType::Int4),
            ),
            &operators,
        );
        assert!(!restriction.is_mergejoinable());
    }

    #[test]
    fn test_find_joininfo_node_reuses_entry() {
        let mut joininfo = vec![];
        find_joininfo_node(&mut joininfo, &Relids::singleton(2));
        find_joininfo_node(&mut joininfo, &Relids::singleton(3));
        find_joininfo_node(&mut joininfo, &Relids::singleton(2));
        assert_eq!(joininfo.len(), 2);
    }

    #[test]
    fn test_union_clauses_by_identity() {
        let operators = OperatorCatalog::builtin();
        let a = RestrictInfo::new(Expr::var(1, 1, DataType::Bool), &operators);
        let b = RestrictInfo::new(Expr::var(1, 1, DataType::Bool), &operators);
        let mut into = vec![a.clone()];
        union_clauses(&mut into, &[a, b]);
        assert_eq!(into.len(), 2);
    }
}
