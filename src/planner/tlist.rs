use crate::datum::Oid;
use crate::expr::Expr;

/// One output column of a relation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetEntry {
    /// 1-based output position.
    pub resno: usize,
    pub expr: Expr,
}

/// ORDER BY / GROUP BY item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortClause {
    pub expr: Expr,
    pub sortop: Oid,
}

pub fn tlist_member<'a>(expr: &Expr, tlist: &'a [TargetEntry]) -> Option<&'a TargetEntry> {
    tlist.iter().find(|tle| &tle.expr == expr)
}

/// Copies `tlist` with result numbers renumbered from `first_resno`.
pub fn new_join_tlist(tlist: &[TargetEntry], first_resno: usize) -> Vec<TargetEntry> {
    tlist
        .iter()
        .enumerate()
        .map(|(i, tle)| TargetEntry {
            resno: first_resno + i,
            expr: tle.expr.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;

    #[test]
    fn test_new_join_tlist() {
        let tlist = vec![
            TargetEntry {
                resno: 1,
                expr: Expr::var(1, 1, DataType::Int4),
            },
            TargetEntry {
                resno: 2,
                expr: Expr::var(1, 3, DataType::Text),
            },
        ];
        let joined = new_join_tlist(&tlist, 4);
        assert_eq!(joined.iter().map(|t| t.resno).collect::<Vec<_>>(), vec![4, 5]);
        assert!(tlist_member(&Expr::var(1, 3, DataType::Text), &joined).is_some());
        assert!(tlist_member(&Expr::var(2, 3, DataType::Text), &joined).is_none());
    }
}
