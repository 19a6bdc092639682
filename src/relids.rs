use std::fmt::{Display, Formatter};
use std::iter::FromIterator;

use itertools::Itertools;
use smallvec::SmallVec;

/// 1-based position of a relation in the query's range table.
pub type RtIndex = usize;

/// Sorted, duplicate free set of range table indexes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Relids(SmallVec<[RtIndex; 4]>);

/// Result of classifying a relid set by size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    Empty,
    Singleton(RtIndex),
    Multiple,
}

impl Relids {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(relid: RtIndex) -> Self {
        let mut ret = Self::new();
        ret.insert(relid);
        ret
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, relid: RtIndex) -> bool {
        self.0.binary_search(&relid).is_ok()
    }

    pub fn insert(&mut self, relid: RtIndex) {
        if let Err(pos) = self.0.binary_search(&relid) {
            self.0.insert(pos, relid);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RtIndex> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &Relids) -> Relids {
        self.iter().merge(other.iter()).dedup().collect()
    }

    pub fn difference(&self, other: &Relids) -> Relids {
        self.iter().filter(|r| !other.contains(*r)).collect()
    }

    pub fn is_subset(&self, other: &Relids) -> bool {
        self.iter().all(|r| other.contains(r))
    }

    pub fn overlaps(&self, other: &Relids) -> bool {
        self.iter().any(|r| other.contains(r))
    }

    pub fn membership(&self) -> Membership {
        match self.0.as_slice() {
            [] => Membership::Empty,
            [single] => Membership::Singleton(*single),
            _ => Membership::Multiple,
        }
    }
}

impl FromIterator<RtIndex> for Relids {
    fn from_iter<T: IntoIterator<Item = RtIndex>>(iter: T) -> Self {
        let mut ret = Relids::new();
        for relid in iter {
            ret.insert(relid);
        }
        ret
    }
}

impl Display for Relids {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.iter().join(" "))
    }
}
