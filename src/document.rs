use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the identifier field inside every stored document body.
pub const ID_FIELD: &str = "_id";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self { created_at: now, updated_at: now }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl Document {
    /// Wrap a BSON body. An `_id` holding a rendered `DocumentId` is reused, any other
    /// `_id` value is kept untouched, and a missing `_id` is filled with a fresh id.
    #[must_use]
    pub fn new(mut data: BsonDocument) -> Self {
        let id = match data.get(ID_FIELD) {
            Some(Bson::String(s)) => DocumentId::parse(s).unwrap_or_default(),
            Some(_) => DocumentId::new(),
            None => {
                let id = DocumentId::new();
                let mut body = BsonDocument::new();
                body.insert(ID_FIELD, id.to_string());
                for (k, v) in data {
                    body.insert(k, v);
                }
                data = body;
                id
            }
        };
        Self { id, data, metadata: Metadata::new() }
    }

    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}
