#![allow(dead_code)]

use std::rc::Rc;

use relopt::catalog::{
    IndexOptInfo, MemoryCatalog, RangeTblEntry, StatisticsEntry, StatisticsStore,
};
use relopt::datum::{DataType, Oid};
use relopt::optimizer::OptimizerContext;
use relopt::planner::PlannerInfo;
use serde::Deserialize;

pub const SHOP: &str = include_str!("../fixtures/shop.json");

#[derive(Debug, Deserialize)]
pub struct RelationFixture {
    pub oid: Oid,
    pub name: String,
    pub pages: f64,
    pub tuples: f64,
}

/// Catalog, statistics and range table of one planning session.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub context: OptimizerContext,
    pub relations: Vec<RelationFixture>,
    #[serde(default)]
    pub statistics: Vec<StatisticsEntry>,
    /// Relation names in range table order; other names are subqueries.
    pub range_table: Vec<String>,
}

impl Fixture {
    pub fn load(json: &str) -> Self {
        serde_json::from_str(json).unwrap()
    }

    pub fn relation(&self, name: &str) -> Oid {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.oid)
            .unwrap()
    }

    pub fn planner(&self) -> PlannerInfo {
        self.planner_with_indexes(vec![])
    }

    /// A planner with every range table entry built and sized.
    pub fn planner_with_indexes(&self, indexes: Vec<(&str, IndexOptInfo)>) -> PlannerInfo {
        let mut catalog = MemoryCatalog::new();
        for r in &self.relations {
            catalog.add_relation(r.oid, r.name.clone(), r.pages, r.tuples);
        }
        for (name, index) in indexes {
            catalog.add_index(self.relation(name), index).unwrap();
        }

        let range_table: Vec<RangeTblEntry> = self
            .range_table
            .iter()
            .map(|name| match self.relations.iter().find(|r| &r.name == name) {
                Some(r) => RangeTblEntry::relation(r.oid, name.clone()),
                None => RangeTblEntry::subquery(name.clone()),
            })
            .collect();
        let n = range_table.len();

        let statistics = StatisticsStore::from(self.statistics.clone());
        let mut root = PlannerInfo::new(
            self.context.clone(),
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
}

pub fn op(root: &PlannerInfo, name: &str, ty: DataType) -> Oid {
    root.operators().find_operator(name, ty, ty).unwrap()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
