use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::datum::{DataType, Oid};
use crate::error::{lookup_error, OptResult};
use crate::expr::{AttrNumber, Expr};
use crate::relids::RtIndex;

/// Entry of the query's range table.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeTblEntry {
    /// Stored relation behind the entry; `None` for subqueries and other non-stored inputs.
    pub relid: Option<Oid>,
    pub alias: String,
}

impl RangeTblEntry {
    pub fn relation<S: Into<String>>(relid: Oid, alias: S) -> Self {
        Self {
            relid: Some(relid),
            alias: alias.into(),
        }
    }

    pub fn subquery<S: Into<String>>(alias: S) -> Self {
        Self {
            relid: None,
            alias: alias.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessMethod {
    BTree,
    Hash,
    RTree,
    Gist,
}

/// One key column of an index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Column(AttrNumber),
    /// Computed key. Vars inside refer to the indexed relation.
    Expr(Expr),
}

impl IndexKey {
    /// Key computed by calling `funcid` over plain columns.
    pub fn function(funcid: Oid, rettype: DataType, columns: &[(AttrNumber, DataType)]) -> Self {
        let args = columns
            .iter()
            .map(|(attno, ty)| Expr::var(0, *attno, *ty))
            .collect();
        IndexKey::Expr(Expr::func(funcid, rettype, args))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexOptInfo {
    pub oid: Oid,
    pub am: AccessMethod,
    pub keys: Vec<IndexKey>,
    /// Sort operator per key column; empty for unordered access methods.
    pub ordering: Vec<Oid>,
    pub unique: bool,
    /// Partial index predicate, implicitly ANDed.
    pub predicate: Vec<Expr>,
    pub pages: f64,
    pub tuples: f64,
}

impl IndexOptInfo {
    pub fn new(oid: Oid, am: AccessMethod, keys: Vec<IndexKey>) -> Self {
        Self {
            oid,
            am,
            keys,
            ordering: vec![],
            unique: false,
            predicate: vec![],
            pages: 1.0,
            tuples: 0.0,
        }
    }

    pub fn with_ordering(mut self, ordering: Vec<Oid>) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_predicate(mut self, predicate: Vec<Expr>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_size(mut self, pages: f64, tuples: f64) -> Self {
        self.pages = pages;
        self.tuples = tuples;
        self
    }

    pub fn ncolumns(&self) -> usize {
        self.keys.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.predicate.is_empty()
    }

    /// Points Vars of key expressions and predicate at range table entry `rti`.
    pub fn bind_to(&mut self, rti: RtIndex) {
        for key in &mut self.keys {
            if let IndexKey::Expr(e) = key {
                e.set_varno(rti);
            }
        }
        for pred in &mut self.predicate {
            pred.set_varno(rti);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelationSize {
    pub pages: f64,
    pub tuples: f64,
    pub has_index: bool,
}

/// Physical catalog consulted when relations are built.
pub trait RelationCatalog {
    fn relation_size(&self, relation: Oid) -> OptResult<RelationSize>;

    /// Index descriptors of `relation`, keys expressed with varno 0.
    fn relation_indexes(&self, relation: Oid) -> OptResult<Vec<IndexOptInfo>>;
}

#[derive(Clone, Debug)]
struct RelationMeta {
    name: String,
    pages: f64,
    tuples: f64,
    indexes: Vec<IndexOptInfo>,
}

/// In-memory catalog, mostly for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    relations: HashMap<Oid, RelationMeta>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relation<S: Into<String>>(
        &mut self,
        relation: Oid,
        name: S,
        pages: f64,
        tuples: f64,
    ) -> &mut Self {
        self.relations.insert(
            relation,
            RelationMeta {
                name: name.into(),
                pages,
                tuples,
                indexes: vec![],
            },
        );
        self
    }

    pub fn add_index(&mut self, relation: Oid, index: IndexOptInfo) -> OptResult<&mut Self> {
        self.relations
            .get_mut(&relation)
            .ok_or_else(|| lookup_error("relation", relation))?
            .indexes
            .push(index);
        Ok(self)
    }

    pub fn relation_name(&self, relation: Oid) -> Option<&str> {
        self.relations.get(&relation).map(|r| r.name.as_str())
    }
}

impl RelationCatalog for MemoryCatalog {
    fn relation_size(&self, relation: Oid) -> OptResult<RelationSize> {
        let meta = self
            .relations
            .get(&relation)
            .ok_or_else(|| lookup_error("relation", relation))?;
        Ok(RelationSize {
            pages: meta.pages,
            tuples: meta.tuples,
            has_index: !meta.indexes.is_empty(),
        })
    }

    fn relation_indexes(&self, relation: Oid) -> OptResult<Vec<IndexOptInfo>> {
        self.relations
            .get(&relation)
            .map(|meta| meta.indexes.clone())
            .ok_or_else(|| lookup_error("relation", relation))
    }
}
