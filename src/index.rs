use crate::errors::DbError;
use crate::query::eval::get_path;
use crate::query::Order;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::mem::discriminant;

/// Name reported for the implicit primary-key index.
pub const ID_INDEX_NAME: &str = "_id_";

pub const INDEX_METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Hash,
    BTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub order: Order,
}

/// Declared shape of an index: ordered key fields with directions, or one hashed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    pub kind: IndexKind,
    #[serde(default)]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::compound([(field, Order::Asc)])
    }

    pub fn compound<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = (S, Order)>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(|(f, order)| IndexKey { field: f.into(), order }).collect(),
            kind: IndexKind::BTree,
            name: None,
        }
    }

    pub fn hashed(field: impl Into<String>) -> Self {
        Self {
            keys: vec![IndexKey { field: field.into(), order: Order::Asc }],
            kind: IndexKind::Hash,
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mongo-style generated name, e.g. `author_1_published_year_-1` or `title_hashed`.
    #[must_use]
    pub fn default_name(&self) -> String {
        match self.kind {
            IndexKind::Hash => format!("{}_hashed", self.leading_field()),
            IndexKind::BTree => self
                .keys
                .iter()
                .map(|k| format!("{}_{}", k.field, k.order.direction()))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.default_name())
    }

    #[must_use]
    pub fn leading_field(&self) -> &str {
        self.keys.first().map_or("", |k| k.field.as_str())
    }

    /// Key pattern as JSON (`{"author": 1, "published_year": -1}`).
    #[must_use]
    pub fn key_pattern(&self) -> Value {
        let mut m = serde_json::Map::new();
        for k in &self.keys {
            let v = match self.kind {
                IndexKind::Hash => Value::from("hashed"),
                IndexKind::BTree => Value::from(k.order.direction()),
            };
            m.insert(k.field.clone(), v);
        }
        Value::Object(m)
    }

    fn same_keys(&self, other: &Self) -> bool {
        self.kind == other.kind && self.keys == other.keys
    }

    fn validate(&self) -> Result<(), DbError> {
        if self.keys.is_empty() {
            return Err(DbError::query("index requires at least one key"));
        }
        if self.kind == IndexKind::Hash && self.keys.len() != 1 {
            return Err(DbError::query("hashed indexes take exactly one field"));
        }
        let mut seen = HashSet::new();
        if !self.keys.iter().all(|k| !k.field.is_empty() && seen.insert(k.field.as_str())) {
            return Err(DbError::query("index keys must be distinct, non-empty fields"));
        }
        Ok(())
    }
}

/// Parse an index key document: `{"title": 1}`, `{"author": 1, "published_year": -1}`,
/// or `{"title": "hashed"}`.
///
/// # Errors
/// Returns `DbError::QueryError` for invalid directions or malformed documents.
pub fn parse_index_keys_json(json: &str) -> Result<IndexSpec, DbError> {
    let v: Value = serde_json::from_str(json)?;
    parse_index_keys_value(&v)
}

/// # Errors
/// See [`parse_index_keys_json`].
pub fn parse_index_keys_value(v: &Value) -> Result<IndexSpec, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("index keys must be a JSON object"))?;
    if obj.len() == 1
        && let Some((field, Value::String(s))) = obj.iter().next()
    {
        return if s == "hashed" {
            Ok(IndexSpec::hashed(field.clone()))
        } else {
            Err(DbError::query(format!("unsupported index type {s}")))
        };
    }
    let mut keys = Vec::with_capacity(obj.len());
    for (field, dir) in obj {
        let order = dir
            .as_i64()
            .and_then(Order::from_direction)
            .ok_or_else(|| DbError::query(format!("index direction for {field} must be 1 or -1")))?;
        keys.push((field.clone(), order));
    }
    let spec = IndexSpec::compound(keys);
    spec.validate()?;
    Ok(spec)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub keys: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub build_time_ms: u128,
}

/// Indexable scalar. Variant order matches the query type brackets
/// (null < numbers < strings < booleans).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKeyKind {
    Null,
    Num(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn key_from_bson(v: &Bson) -> Option<IndexKeyKind> {
    match v {
        Bson::Null => Some(IndexKeyKind::Null),
        Bson::String(s) => Some(IndexKeyKind::Str(s.clone())),
        Bson::Int32(i) => Some(IndexKeyKind::Num(OrderedFloat(f64::from(*i)))),
        Bson::Int64(i) => Some(IndexKeyKind::Num(OrderedFloat(*i as f64))),
        Bson::Double(f) => Some(IndexKeyKind::Num(OrderedFloat(*f))),
        Bson::Boolean(b) => Some(IndexKeyKind::Bool(*b)),
        _ => None,
    }
}

/// Key of a missing field: indexed as null.
fn key_for_field(doc: &BsonDocument, field: &str) -> Option<IndexKeyKind> {
    get_path(doc, field).map_or(Some(IndexKeyKind::Null), key_from_bson)
}

/// One component of a compound key, ordered by its declared direction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Asc(IndexKeyKind),
    Desc(Reverse<IndexKeyKind>),
}

impl KeyPart {
    fn new(key: IndexKeyKind, order: Order) -> Self {
        match order {
            Order::Asc => Self::Asc(key),
            Order::Desc => Self::Desc(Reverse(key)),
        }
    }

    const fn inner(&self) -> &IndexKeyKind {
        match self {
            Self::Asc(k) | Self::Desc(Reverse(k)) => k,
        }
    }
}

/// Result of an index lookup, before documents are fetched.
#[derive(Debug, Clone, Default)]
pub struct IndexScan {
    pub ids: Vec<DocumentId>,
    pub keys_examined: usize,
}

#[derive(Debug, Clone)]
pub struct HashIndex {
    pub spec: IndexSpec,
    pub map: HashMap<IndexKeyKind, HashSet<DocumentId>>,
    pub unindexed: HashSet<DocumentId>,
    pub stats: IndexStats,
}

impl HashIndex {
    #[must_use]
    pub fn new(spec: IndexSpec) -> Self {
        Self { spec, map: HashMap::new(), unindexed: HashSet::new(), stats: IndexStats::default() }
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: &DocumentId) {
        match key_for_field(doc, self.spec.leading_field()) {
            Some(k) => {
                if self.map.entry(k).or_default().insert(id.clone()) {
                    self.stats.entries += 1;
                }
            }
            None => {
                self.unindexed.insert(id.clone());
            }
        }
        self.stats.keys = self.map.len();
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        match key_for_field(doc, self.spec.leading_field()) {
            Some(k) => {
                if let Some(set) = self.map.get_mut(&k) {
                    if set.remove(id) {
                        self.stats.entries = self.stats.entries.saturating_sub(1);
                    }
                    if set.is_empty() {
                        self.map.remove(&k);
                    }
                }
            }
            None => {
                self.unindexed.remove(id);
            }
        }
        self.stats.keys = self.map.len();
    }

    pub fn lookup_eq(&mut self, v: &Bson) -> Option<IndexScan> {
        let k = key_from_bson(v)?;
        let mut ids: Vec<DocumentId> = self.unindexed.iter().cloned().collect();
        let keys_examined = match self.map.get(&k) {
            Some(set) => {
                self.stats.hits += 1;
                ids.extend(set.iter().cloned());
                1
            }
            None => {
                self.stats.misses += 1;
                0
            }
        };
        Some(IndexScan { ids, keys_examined })
    }
}

#[derive(Debug, Clone)]
pub struct BTreeIndex {
    pub spec: IndexSpec,
    pub map: BTreeMap<Vec<KeyPart>, BTreeSet<DocumentId>>,
    pub unindexed: BTreeSet<DocumentId>,
    pub stats: IndexStats,
}

impl BTreeIndex {
    #[must_use]
    pub fn new(spec: IndexSpec) -> Self {
        Self { spec, map: BTreeMap::new(), unindexed: BTreeSet::new(), stats: IndexStats::default() }
    }

    fn key_of(&self, doc: &BsonDocument) -> Option<Vec<KeyPart>> {
        self.spec
            .keys
            .iter()
            .map(|k| key_for_field(doc, &k.field).map(|kk| KeyPart::new(kk, k.order)))
            .collect()
    }

    fn leading_order(&self) -> Order {
        self.spec.keys.first().map_or(Order::Asc, |k| k.order)
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: &DocumentId) {
        match self.key_of(doc) {
            Some(k) => {
                if self.map.entry(k).or_default().insert(id.clone()) {
                    self.stats.entries += 1;
                }
            }
            None => {
                self.unindexed.insert(id.clone());
            }
        }
        self.stats.keys = self.map.len();
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        match self.key_of(doc) {
            Some(k) => {
                if let Some(set) = self.map.get_mut(&k) {
                    if set.remove(id) {
                        self.stats.entries = self.stats.entries.saturating_sub(1);
                    }
                    if set.is_empty() {
                        self.map.remove(&k);
                    }
                }
            }
            None => {
                self.unindexed.remove(id);
            }
        }
        self.stats.keys = self.map.len();
    }

    /// Equality on the leading key field (prefix scan for compound keys).
    pub fn lookup_eq(&mut self, v: &Bson) -> Option<IndexScan> {
        let target = key_from_bson(v)?;
        let start = vec![KeyPart::new(target.clone(), self.leading_order())];
        let mut scan = IndexScan { ids: self.unindexed.iter().cloned().collect(), keys_examined: 0 };
        for (k, ids) in self.map.range(start..) {
            if k.first().map(KeyPart::inner) != Some(&target) {
                break;
            }
            scan.keys_examined += 1;
            scan.ids.extend(ids.iter().cloned());
        }
        self.record(scan.keys_examined);
        Some(scan)
    }

    /// Range on the leading key field. Only keys in the bounds' type bracket match.
    pub fn lookup_range(
        &mut self,
        min: Option<&Bson>,
        max: Option<&Bson>,
        inclusive_min: bool,
        inclusive_max: bool,
    ) -> Option<IndexScan> {
        let lo = match min {
            Some(b) => Some(key_from_bson(b)?),
            None => None,
        };
        let hi = match max {
            Some(b) => Some(key_from_bson(b)?),
            None => None,
        };
        let bracket = lo.as_ref().or(hi.as_ref()).map(discriminant)?;
        let order = self.leading_order();
        // bounds expressed in the map's own iteration order
        let (first, last) = match order {
            Order::Asc => (lo.clone(), hi.clone()),
            Order::Desc => (hi.clone(), lo.clone()),
        };
        let past_end = |k: &IndexKeyKind| match (&last, order) {
            (Some(l), Order::Asc) => k > l,
            (Some(l), Order::Desc) => k < l,
            (None, _) => false,
        };
        let in_range = |k: &IndexKeyKind| {
            discriminant(k) == bracket
                && lo.as_ref().is_none_or(|l| if inclusive_min { k >= l } else { k > l })
                && hi.as_ref().is_none_or(|h| if inclusive_max { k <= h } else { k < h })
        };
        let iter: Box<dyn Iterator<Item = (&Vec<KeyPart>, &BTreeSet<DocumentId>)>> = match first {
            Some(f) => Box::new(self.map.range(vec![KeyPart::new(f, order)]..)),
            None => Box::new(self.map.iter()),
        };
        let mut scan = IndexScan { ids: self.unindexed.iter().cloned().collect(), keys_examined: 0 };
        for (k, ids) in iter {
            let Some(head) = k.first().map(KeyPart::inner) else { continue };
            if past_end(head) {
                break;
            }
            scan.keys_examined += 1;
            if in_range(head) {
                scan.ids.extend(ids.iter().cloned());
            }
        }
        self.record(scan.keys_examined);
        Some(scan)
    }

    fn record(&mut self, examined: usize) {
        if examined > 0 {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub enum IndexImpl {
    Hash(HashIndex),
    BTree(BTreeIndex),
}

impl IndexImpl {
    #[must_use]
    pub const fn spec(&self) -> &IndexSpec {
        match self {
            Self::Hash(h) => &h.spec,
            Self::BTree(b) => &b.spec,
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &IndexStats {
        match self {
            Self::Hash(h) => &h.stats,
            Self::BTree(b) => &b.stats,
        }
    }

    pub const fn stats_mut(&mut self) -> &mut IndexStats {
        match self {
            Self::Hash(h) => &mut h.stats,
            Self::BTree(b) => &mut b.stats,
        }
    }

    pub fn lookup_eq(&mut self, v: &Bson) -> Option<IndexScan> {
        match self {
            Self::Hash(h) => h.lookup_eq(v),
            Self::BTree(b) => b.lookup_eq(v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub spec: IndexSpec,
}

#[derive(Debug, Default)]
pub struct IndexManager {
    pub indexes: BTreeMap<String, IndexImpl>, // key: index name
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self { indexes: BTreeMap::new() }
    }

    /// Register an (empty) index and return its name. Re-declaring identical keys is a no-op.
    ///
    /// # Errors
    /// `IndexConflict` when the name is taken by different keys; `QueryError` for invalid specs.
    pub fn create_index(&mut self, spec: IndexSpec) -> Result<(String, bool), DbError> {
        spec.validate()?;
        let name = spec.name();
        if name == ID_INDEX_NAME {
            return Err(DbError::IndexConflict(format!("{ID_INDEX_NAME} is reserved")));
        }
        if let Some(existing) = self.indexes.get(&name) {
            return if existing.spec().same_keys(&spec) {
                Ok((name, false))
            } else {
                Err(DbError::IndexConflict(format!("an index named {name} already exists with different keys")))
            };
        }
        let mut spec = spec;
        spec.name = Some(name.clone());
        let idx = match spec.kind {
            IndexKind::Hash => IndexImpl::Hash(HashIndex::new(spec)),
            IndexKind::BTree => IndexImpl::BTree(BTreeIndex::new(spec)),
        };
        self.indexes.insert(name.clone(), idx);
        Ok((name, true))
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .map(|(name, i)| IndexDescriptor { name: name.clone(), spec: i.spec().clone() })
            .collect()
    }

    #[must_use]
    pub fn specs(&self) -> Vec<IndexSpec> {
        self.indexes.values().map(|i| i.spec().clone()).collect()
    }
}

pub fn index_insert_all(mgr: &mut IndexManager, doc: &BsonDocument, id: &DocumentId) {
    for idx in mgr.indexes.values_mut() {
        match idx {
            IndexImpl::Hash(h) => h.insert(doc, id),
            IndexImpl::BTree(b) => b.insert(doc, id),
        }
    }
}

pub fn index_remove_all(mgr: &mut IndexManager, doc: &BsonDocument, id: &DocumentId) {
    for idx in mgr.indexes.values_mut() {
        match idx {
            IndexImpl::Hash(h) => h.remove(doc, id),
            IndexImpl::BTree(b) => b.remove(doc, id),
        }
    }
}

pub fn lookup_eq(mgr: &mut IndexManager, name: &str, v: &Bson) -> Option<IndexScan> {
    mgr.indexes.get_mut(name)?.lookup_eq(v)
}

pub fn lookup_range(
    mgr: &mut IndexManager,
    name: &str,
    min: Option<&Bson>,
    max: Option<&Bson>,
    incl_min: bool,
    incl_max: bool,
) -> Option<IndexScan> {
    match mgr.indexes.get_mut(name) {
        Some(IndexImpl::BTree(b)) => b.lookup_range(min, max, incl_min, incl_max),
        _ => None,
    }
}
