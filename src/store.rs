//! The seam between the typed books surface and whatever holds the documents.
use crate::aggregate::{Pipeline, aggregate};
use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::explain::{ExplainReport, Verbosity};
use crate::index::{IndexDescriptor, IndexSpec};
use crate::query::{
    self, DeleteReport, Filter, FindOptions, UpdateDoc, UpdateReport,
};
use crate::types::DocumentId;
use bson::Document as BsonDocument;
use std::sync::Arc;

/// Operations a document store must offer. All calls are synchronous.
pub trait DocumentStore {
    /// # Errors
    /// Store-specific; the in-memory store rejects duplicate ids.
    fn insert_one(&self, doc: BsonDocument) -> Result<DocumentId, DbError>;

    /// # Errors
    /// Stops at the first failing insert; earlier documents stay inserted.
    fn insert_many(&self, docs: Vec<BsonDocument>) -> Result<Vec<DocumentId>, DbError> {
        docs.into_iter().map(|d| self.insert_one(d)).collect()
    }

    /// # Errors
    /// Store-specific.
    fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>, DbError>;

    /// # Errors
    /// Store-specific.
    fn count(&self, filter: &Filter) -> Result<usize, DbError>;

    /// # Errors
    /// `QueryError` for invalid update documents.
    fn update_one(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError>;

    /// # Errors
    /// `QueryError` for invalid update documents.
    fn update_many(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError>;

    /// # Errors
    /// Store-specific.
    fn delete_one(&self, filter: &Filter) -> Result<DeleteReport, DbError>;

    /// # Errors
    /// Store-specific.
    fn delete_many(&self, filter: &Filter) -> Result<DeleteReport, DbError>;

    /// # Errors
    /// `QueryError` from expression evaluation.
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError>;

    /// # Errors
    /// `IndexConflict` when the name is taken by different keys.
    fn create_index(&self, spec: IndexSpec) -> Result<String, DbError>;

    /// # Errors
    /// `NoSuchIndex` for unknown names.
    fn drop_index(&self, name: &str) -> Result<(), DbError>;

    /// # Errors
    /// Store-specific.
    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, DbError>;

    /// # Errors
    /// Store-specific.
    fn explain(&self, filter: &Filter, opts: &FindOptions, verbosity: Verbosity) -> Result<ExplainReport, DbError>;
}

impl DocumentStore for Arc<Collection> {
    fn insert_one(&self, doc: BsonDocument) -> Result<DocumentId, DbError> {
        self.insert_document(Document::new(doc))
    }

    fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>, DbError> {
        Ok(query::find_docs(self, filter, opts).into_data())
    }

    fn count(&self, filter: &Filter) -> Result<usize, DbError> {
        Ok(query::count_docs(self, filter))
    }

    fn update_one(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
        query::update_one(self, filter, update)
    }

    fn update_many(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
        query::update_many(self, filter, update)
    }

    fn delete_one(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        Ok(query::delete_one(self, filter))
    }

    fn delete_many(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        Ok(query::delete_many(self, filter))
    }

    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError> {
        aggregate(self, pipeline)
    }

    fn create_index(&self, spec: IndexSpec) -> Result<String, DbError> {
        Collection::create_index(self, spec)
    }

    fn drop_index(&self, name: &str) -> Result<(), DbError> {
        Collection::drop_index(self, name)
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, DbError> {
        Ok(Collection::list_indexes(self))
    }

    fn explain(&self, filter: &Filter, opts: &FindOptions, verbosity: Verbosity) -> Result<ExplainReport, DbError> {
        Ok(query::explain_find(self, filter, opts, verbosity))
    }
}
