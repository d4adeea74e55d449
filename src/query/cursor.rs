use crate::collection::Collection;
use crate::document::Document;
use crate::types::DocumentId;
use bson::Document as BsonDocument;
use std::sync::Arc;

/// Lazy result set. Unsorted, unprojected finds keep only ids and fetch each document
/// when reached (documents deleted in between are skipped); otherwise the shaped
/// documents are held directly.
#[derive(Clone)]
pub struct Cursor {
    pub collection: Arc<Collection>,
    pub ids: Vec<DocumentId>,
    pub pos: usize,
    pub docs: Option<Vec<Document>>, // when present, iterate these
}

impl Cursor {
    pub(crate) fn from_ids(collection: Arc<Collection>, ids: Vec<DocumentId>) -> Self {
        Self { collection, ids, pos: 0, docs: None }
    }

    pub(crate) fn from_docs(collection: Arc<Collection>, docs: Vec<Document>) -> Self {
        Self { collection, ids: Vec::new(), pos: 0, docs: Some(docs) }
    }

    /// Number of results not yet yielded.
    #[must_use]
    pub fn len(&self) -> usize {
        let total = self.docs.as_ref().map_or(self.ids.len(), Vec::len);
        total.saturating_sub(self.pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn advance(&mut self) -> Option<Document> {
        if let Some(docs) = &self.docs {
            let d = docs.get(self.pos).cloned();
            self.pos += usize::from(d.is_some());
            return d;
        }
        while let Some(id) = self.ids.get(self.pos) {
            self.pos += 1;
            if let Some(d) = self.collection.find_document(id) {
                return Some(d);
            }
        }
        None
    }

    #[must_use]
    pub fn to_vec(mut self) -> Vec<Document> {
        if let Some(mut docs) = self.docs.take() {
            return docs.split_off(self.pos.min(docs.len()));
        }
        let mut out = Vec::with_capacity(self.len());
        while let Some(d) = self.advance() {
            out.push(d);
        }
        out
    }

    /// Remaining results as plain BSON bodies.
    #[must_use]
    pub fn into_data(self) -> Vec<BsonDocument> {
        self.to_vec().into_iter().map(|d| d.data).collect()
    }
}

impl Iterator for Cursor {
    type Item = Document;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
