//! Fixtures shared by unit tests.

use std::rc::Rc;

use crate::catalog::{
    ColumnStatistics, IndexOptInfo, MemoryCatalog, RangeTblEntry, StatisticsStore,
};
use crate::datum::{DataType, Oid};
use crate::expr::AttrNumber;
use crate::optimizer::OptimizerContext;
use crate::planner::PlannerInfo;

pub(crate) struct TableDef {
    pub oid: Oid,
    pub pages: f64,
    pub tuples: f64,
    /// Keyed by relation or index oid.
    pub stats: Vec<(Oid, AttrNumber, ColumnStatistics)>,
    pub indexes: Vec<IndexOptInfo>,
}

impl TableDef {
    pub fn new(oid: Oid, pages: f64, tuples: f64) -> Self {
        Self {
            oid,
            pages,
            tuples,
            stats: vec![],
            indexes: vec![],
        }
    }

    pub fn with_stats(mut self, attno: AttrNumber, stats: ColumnStatistics) -> Self {
        self.stats.push((self.oid, attno, stats));
        self
    }

    pub fn with_index(mut self, index: IndexOptInfo) -> Self {
        self.indexes.push(index);
        self
    }

    /// Statistics of an expression index column.
    pub fn with_index_stats(
        mut self,
        index: Oid,
        position: AttrNumber,
        stats: ColumnStatistics,
    ) -> Self {
        self.stats.push((index, position, stats));
        self
    }
}

/// A planner over `tables` (range table indexes 1..) followed by `subqueries`, with all
/// base relations built and sized.
pub(crate) fn planner(tables: Vec<TableDef>, subqueries: Vec<&str>) -> PlannerInfo {
    let mut catalog = MemoryCatalog::new();
    let mut statistics = StatisticsStore::new();
    let mut range_table = vec![];

    for table in tables {
        catalog.add_relation(table.oid, format!("t{}", table.oid), table.pages, table.tuples);
        for index in table.indexes {
            catalog.add_index(table.oid, index).unwrap();
        }
        for (oid, attno, stats) in table.stats {
            statistics.insert(oid, attno, stats);
        }
        range_table.push(RangeTblEntry::relation(table.oid, format!("t{}", table.oid)));
    }
    for alias in subqueries {
        range_table.push(RangeTblEntry::subquery(alias));
    }

    let n = range_table.len();
    let mut root = PlannerInfo::new(
        OptimizerContext::default(),
        Rc::new(catalog),
        Rc::new(statistics),
        range_table,
    );
    for relid in 1..=n {
        root.get_base_rel(relid).unwrap();
        root.set_base_rel_size_estimates(relid).unwrap();
    }
    root
}

/// Builtin operator `name` over two values of `ty`.
pub(crate) fn op(root: &PlannerInfo, name: &str, ty: DataType) -> Oid {
    root.operators().find_operator(name, ty, ty).unwrap()
}

pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
