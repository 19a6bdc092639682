use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::datum::{Datum, Oid};
use crate::expr::AttrNumber;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatisticKind {
    /// Most common values with their frequencies, ordered by descending frequency.
    Mcv,
    /// Equi-depth bounds, excluding the most common values.
    Histogram,
    /// Physical vs logical order correlation, a single number.
    Correlation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSlot {
    pub kind: StatisticKind,
    /// Operator the slot was built with; `0` when irrelevant.
    #[serde(default)]
    pub op: Oid,
    #[serde(default)]
    pub values: Vec<Datum>,
    #[serde(default)]
    pub numbers: Vec<f64>,
}

/// Snapshot of gathered statistics for one column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub null_frac: f64,
    /// Average stored width in bytes.
    #[serde(default)]
    pub avg_width: i32,
    /// Positive: absolute count. Negative: negated fraction of the row count. Zero: unknown.
    pub n_distinct: f64,
    #[serde(default)]
    pub slots: Vec<StatisticsSlot>,
}

impl ColumnStatistics {
    /// First slot of `kind`, restricted to `op` when given.
    pub fn slot(&self, kind: StatisticKind, op: Option<Oid>) -> Option<&StatisticsSlot> {
        self.slots
            .iter()
            .find(|s| s.kind == kind && op.map_or(true, |op| s.op == op))
    }
}

/// Source of column statistics.
pub trait StatisticsProvider {
    fn lookup_column_stats(&self, relation: Oid, attnum: AttrNumber)
        -> Option<Arc<ColumnStatistics>>;

    /// Statistics of an expression index column, stored under the index's own id.
    fn lookup_index_stats(&self, index: Oid, position: AttrNumber) -> Option<Arc<ColumnStatistics>> {
        self.lookup_column_stats(index, position)
    }
}

/// Wire form of one statistics row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticsEntry {
    pub relation: Oid,
    pub attnum: AttrNumber,
    pub stats: ColumnStatistics,
}

#[derive(Clone, Debug, Default)]
pub struct StatisticsStore {
    entries: HashMap<(Oid, AttrNumber), Arc<ColumnStatistics>>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, relation: Oid, attnum: AttrNumber, stats: ColumnStatistics) {
        self.entries.insert((relation, attnum), Arc::new(stats));
    }
}

impl From<Vec<StatisticsEntry>> for StatisticsStore {
    fn from(entries: Vec<StatisticsEntry>) -> Self {
        let mut store = StatisticsStore::new();
        for e in entries {
            store.insert(e.relation, e.attnum, e.stats);
        }
        store
    }
}

impl StatisticsProvider for StatisticsStore {
    fn lookup_column_stats(
        &self,
        relation: Oid,
        attnum: AttrNumber,
    ) -> Option<Arc<ColumnStatistics>> {
        self.entries.get(&(relation, attnum)).cloned()
    }
}

/// Borrowed statistics snapshot, released when dropped.
#[derive(Debug)]
pub struct StatsGuard {
    stats: Arc<ColumnStatistics>,
    outstanding: Rc<Cell<usize>>,
}

impl Deref for StatsGuard {
    type Target = ColumnStatistics;

    fn deref(&self) -> &ColumnStatistics {
        &self.stats
    }
}

impl Drop for StatsGuard {
    fn drop(&mut self) {
        self.outstanding.set(self.outstanding.get() - 1);
    }
}

/// Session view over a provider: snapshots are fetched at most once per key and every
/// borrow is counted until its guard drops.
pub struct StatisticsCache {
    provider: Rc<dyn StatisticsProvider>,
    snapshots: RefCell<HashMap<(Oid, AttrNumber), Option<Arc<ColumnStatistics>>>>,
    outstanding: Rc<Cell<usize>>,
}

impl StatisticsCache {
    pub fn new(provider: Rc<dyn StatisticsProvider>) -> Self {
        Self {
            provider,
            snapshots: RefCell::new(HashMap::new()),
            outstanding: Rc::new(Cell::new(0)),
        }
    }

    pub fn acquire_column(&self, relation: Oid, attnum: AttrNumber) -> Option<StatsGuard> {
        self.acquire(relation, attnum, false)
    }

    pub fn acquire_index(&self, index: Oid, position: AttrNumber) -> Option<StatsGuard> {
        self.acquire(index, position, true)
    }

    fn acquire(&self, id: Oid, attnum: AttrNumber, index: bool) -> Option<StatsGuard> {
        let stats = self
            .snapshots
            .borrow_mut()
            .entry((id, attnum))
            .or_insert_with(|| {
                trace!("Fetching statistics for {}.{}", id, attnum);
                if index {
                    self.provider.lookup_index_stats(id, attnum)
                } else {
                    self.provider.lookup_column_stats(id, attnum)
                }
            })
            .clone()?;
        self.outstanding.set(self.outstanding.get() + 1);
        Some(StatsGuard {
            stats,
            outstanding: self.outstanding.clone(),
        })
    }

    /// Number of guards not yet dropped.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> ColumnStatistics {
        ColumnStatistics {
            null_frac: 0.1,
            avg_width: 4,
            n_distinct: -0.5,
            slots: vec![StatisticsSlot {
                kind: StatisticKind::Mcv,
                op: 0,
                values: vec![Datum::Int4(1)],
                numbers: vec![0.3],
            }],
        }
    }

    #[test]
    fn test_guards_are_counted() {
        let mut store = StatisticsStore::new();
        store.insert(1, 1, stats());
        let cache = StatisticsCache::new(Rc::new(store));

        let g1 = cache.acquire_column(1, 1).unwrap();
        let g2 = cache.acquire_column(1, 1).unwrap();
        assert_eq!(cache.outstanding(), 2);
        assert_eq!(g1.null_frac, 0.1);
        drop(g1);
        drop(g2);
        assert_eq!(cache.outstanding(), 0);

        assert!(cache.acquire_column(1, 2).is_none());
        assert_eq!(cache.outstanding(), 0);
    }

    #[test]
    fn test_slot_lookup() {
        let s = stats();
        assert!(s.slot(StatisticKind::Mcv, None).is_some());
        assert!(s.slot(StatisticKind::Mcv, Some(5)).is_none());
        assert!(s.slot(StatisticKind::Histogram, None).is_none());
    }
}
