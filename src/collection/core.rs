use crate::document::{Document, ID_FIELD};
use crate::errors::DbError;
use crate::index::{IndexKeyKind, IndexManager, key_from_bson};
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Identity of a body `_id` value. Numbers compare by value, as they do in filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum BodyId {
    Scalar(IndexKeyKind),
    Other(String),
}

impl BodyId {
    pub(crate) fn of(doc: &Document) -> Option<Self> {
        let v = doc.data.get(ID_FIELD)?;
        Some(key_from_bson(v).map_or_else(|| Self::Other(v.clone().into_relaxed_extjson().to_string()), Self::Scalar))
    }
}

/// Documents keyed by insertion sequence, so iteration yields natural order.
#[derive(Debug, Default)]
pub(crate) struct DocStore {
    pub(crate) docs: BTreeMap<u64, Document>,
    pub(crate) positions: HashMap<DocumentId, u64>,
    body_ids: HashMap<BodyId, u64>,
    next_seq: u64,
}

impl DocStore {
    /// Append a document; both its `DocumentId` and its body `_id` must be unused.
    pub(crate) fn push(&mut self, doc: Document) -> Result<(), DbError> {
        let body_id = BodyId::of(&doc);
        if self.positions.contains_key(&doc.id) || body_id.as_ref().is_some_and(|k| self.body_ids.contains_key(k)) {
            let shown = doc.data.get(ID_FIELD).map_or_else(|| doc.id.to_string(), ToString::to_string);
            return Err(DbError::InvalidDocument(format!("duplicate _id {shown}")));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(doc.id.clone(), seq);
        if let Some(k) = body_id {
            self.body_ids.insert(k, seq);
        }
        self.docs.insert(seq, doc);
        Ok(())
    }

    pub(crate) fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.positions.get(id).and_then(|seq| self.docs.get(seq))
    }

    pub(crate) fn get_mut(&mut self, id: &DocumentId) -> Option<&mut Document> {
        let seq = *self.positions.get(id)?;
        self.docs.get_mut(&seq)
    }

    pub(crate) fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let seq = *self.positions.get(id)?;
        self.remove_seq(seq)
    }

    pub(crate) fn remove_seq(&mut self, seq: u64) -> Option<Document> {
        let doc = self.docs.remove(&seq)?;
        self.positions.remove(&doc.id);
        if let Some(k) = BodyId::of(&doc) {
            self.body_ids.remove(&k);
        }
        Some(doc)
    }
}

#[derive(Debug)]
pub struct Collection {
    pub name: Arc<RwLock<String>>,
    pub(crate) store: RwLock<DocStore>,
    pub indexes: RwLock<IndexManager>,
    pub(crate) build_lock: RwLock<()>,
}

impl Collection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::new(RwLock::new(name.into())),
            store: RwLock::new(DocStore::default()),
            indexes: RwLock::new(IndexManager::new()),
            build_lock: RwLock::new(()),
        }
    }

    pub fn set_name(&self, new_name: String) {
        *self.name.write() = new_name;
    }

    /// Returns the collection's name as a String (cloned), hiding the `RwLock`.
    pub fn name_str(&self) -> String {
        self.name.read().clone()
    }

    pub fn len(&self) -> usize {
        self.store.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().docs.is_empty()
    }
}
