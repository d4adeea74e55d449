pub mod aggregate;
pub mod book;
pub mod books;
pub mod cli;
pub mod collection;
pub mod config;
pub mod document;
pub mod errors;
pub mod explain;
pub mod export;
pub mod import;
pub mod index;
pub mod logger;
pub mod query;
pub mod store;
pub mod types;
pub mod utils;

use crate::aggregate::Pipeline;
use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::explain::{ExplainReport, Verbosity};
use crate::export::{ExportFormat, ExportOptions};
use crate::import::{ImportFormat, ImportOptions};
use crate::index::{INDEX_METADATA_VERSION, IndexSpec};
use crate::types::DocumentId;
use bson::Document as BsonDocument;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Named in-memory collections.
#[derive(Debug, Default)]
pub struct Database {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

/// On-disk shape of the index sidecar.
#[derive(Debug, Serialize, Deserialize)]
struct IndexMetadata {
    version: u32,
    collections: BTreeMap<String, Vec<IndexSpec>>,
}

/// `books.ndjson` keeps its index specs in `books.ndjson.indexes.json`.
#[must_use]
pub fn index_metadata_path(data_file: &Path) -> PathBuf {
    let mut s = data_file.as_os_str().to_os_string();
    s.push(".indexes.json");
    PathBuf::from(s)
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `CollectionAlreadyExists` when the name is taken.
    pub fn create_collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        let mut cols = self.collections.write();
        if cols.contains_key(name) {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        let col = Arc::new(Collection::new(name));
        cols.insert(name.to_string(), Arc::clone(&col));
        log::info!("created collection {name}");
        Ok(col)
    }

    pub fn get_or_create_collection(&self, name: &str) -> Arc<Collection> {
        let mut cols = self.collections.write();
        Arc::clone(cols.entry(name.to_string()).or_insert_with(|| Arc::new(Collection::new(name))))
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// # Errors
    /// `NoSuchCollection` when absent.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        self.get_collection(name).ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    pub fn delete_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// # Errors
    /// `NoSuchCollection` for an unknown source, `CollectionAlreadyExists` for a taken target.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<(), DbError> {
        let mut cols = self.collections.write();
        if cols.contains_key(new) {
            return Err(DbError::CollectionAlreadyExists(new.to_string()));
        }
        let col = cols.remove(old).ok_or_else(|| DbError::NoSuchCollection(old.to_string()))?;
        col.set_name(new.to_string());
        cols.insert(new.to_string(), col);
        Ok(())
    }

    /// Sorted collection names.
    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// # Errors
    /// `NoSuchCollection`, or the collection's insert error.
    pub fn insert_document(&self, collection: &str, data: BsonDocument) -> Result<DocumentId, DbError> {
        self.collection(collection)?.insert_document(Document::new(data))
    }

    // --- Query API (façade over query and aggregate) ---

    /// # Errors
    /// `NoSuchCollection`.
    pub fn find(
        &self,
        collection: &str,
        filter: &query::Filter,
        opts: &query::FindOptions,
    ) -> Result<query::Cursor, DbError> {
        Ok(query::find_docs(&self.collection(collection)?, filter, opts))
    }

    /// # Errors
    /// `NoSuchCollection`.
    pub fn count(&self, collection: &str, filter: &query::Filter) -> Result<usize, DbError> {
        Ok(query::count_docs(&self.collection(collection)?, filter))
    }

    /// # Errors
    /// `NoSuchCollection` or an invalid update.
    pub fn update_one(
        &self,
        collection: &str,
        filter: &query::Filter,
        update: &query::UpdateDoc,
    ) -> Result<query::UpdateReport, DbError> {
        query::update_one(&self.collection(collection)?, filter, update)
    }

    /// # Errors
    /// `NoSuchCollection` or an invalid update.
    pub fn update_many(
        &self,
        collection: &str,
        filter: &query::Filter,
        update: &query::UpdateDoc,
    ) -> Result<query::UpdateReport, DbError> {
        query::update_many(&self.collection(collection)?, filter, update)
    }

    /// # Errors
    /// `NoSuchCollection`.
    pub fn delete_one(&self, collection: &str, filter: &query::Filter) -> Result<query::DeleteReport, DbError> {
        Ok(query::delete_one(&self.collection(collection)?, filter))
    }

    /// # Errors
    /// `NoSuchCollection`.
    pub fn delete_many(&self, collection: &str, filter: &query::Filter) -> Result<query::DeleteReport, DbError> {
        Ok(query::delete_many(&self.collection(collection)?, filter))
    }

    /// # Errors
    /// `NoSuchCollection` or expression errors.
    pub fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError> {
        aggregate::aggregate(&self.collection(collection)?, pipeline)
    }

    /// # Errors
    /// `NoSuchCollection`.
    pub fn explain(
        &self,
        collection: &str,
        filter: &query::Filter,
        opts: &query::FindOptions,
        verbosity: Verbosity,
    ) -> Result<ExplainReport, DbError> {
        Ok(query::explain_find(&self.collection(collection)?, filter, opts, verbosity))
    }

    // --- Files ---

    /// Load `path` into `collection` (created if needed). A missing file is an empty collection.
    ///
    /// # Errors
    /// I/O and parse errors from the import.
    pub fn load_collection_file(&self, collection: &str, path: &Path) -> Result<Arc<Collection>, DbError> {
        let col = self.get_or_create_collection(collection);
        if path.exists() {
            let opts = ImportOptions { format: ImportFormat::Auto, progress_every: None, ..ImportOptions::default() };
            let report = import::import_file(&col, path, &opts)?;
            log::debug!("loaded {} documents from {}", report.inserted, path.display());
        }
        Ok(col)
    }

    /// Write `collection` to `path` atomically, in the format its extension names (NDJSON otherwise).
    ///
    /// # Errors
    /// `NoSuchCollection` or I/O errors.
    pub fn save_collection_file(&self, collection: &str, path: &Path) -> Result<(), DbError> {
        let col = self.collection(collection)?;
        let format = ExportFormat::from_extension(path.extension().and_then(|e| e.to_str()));
        let opts = ExportOptions { format, ..ExportOptions::default() };
        export::export_file(&col, path, &opts)?;
        Ok(())
    }

    /// Persist every collection's non-`_id_` index specs as versioned JSON.
    ///
    /// # Errors
    /// Serialization or I/O errors.
    pub fn save_index_metadata(&self, path: &Path) -> Result<(), DbError> {
        let collections = self
            .collections
            .read()
            .iter()
            .map(|(name, col)| (name.clone(), col.indexes.read().specs()))
            .collect();
        let meta = IndexMetadata { version: INDEX_METADATA_VERSION, collections };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, &meta)?;
        tmp.persist(path).map_err(|e| DbError::from(e.error))?;
        Ok(())
    }

    /// Recreate the indexes recorded at `path`. A missing file loads nothing.
    /// Returns the number of indexes created.
    ///
    /// # Errors
    /// Malformed metadata, an unsupported version, or conflicting specs.
    pub fn load_index_metadata(&self, path: &Path) -> Result<usize, DbError> {
        if !path.exists() {
            return Ok(0);
        }
        let meta: IndexMetadata = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if meta.version != INDEX_METADATA_VERSION {
            return Err(DbError::InvalidDocument(format!(
                "unsupported index metadata version {} in {}",
                meta.version,
                path.display()
            )));
        }
        let mut created = 0;
        for (name, specs) in meta.collections {
            let col = self.get_or_create_collection(&name);
            for spec in specs {
                col.create_index(spec)?;
                created += 1;
            }
        }
        Ok(created)
    }
}
