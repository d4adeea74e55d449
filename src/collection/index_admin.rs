use super::core::Collection;
use crate::errors::DbError;
use crate::index::{ID_INDEX_NAME, IndexDescriptor, IndexImpl, IndexSpec, IndexStats};

impl Collection {
    /// Create an index and build it from the current documents. Returns the index name.
    ///
    /// # Errors
    /// `IndexConflict` when the name is taken by different keys.
    pub fn create_index(&self, spec: IndexSpec) -> Result<String, DbError> {
        let _wguard = self.build_lock.write();
        let mut mgr = self.indexes.write();
        let (name, created) = mgr.create_index(spec)?;
        if !created {
            return Ok(name);
        }
        // offline build over the current documents, new index only
        let start = std::time::Instant::now();
        let store = self.store.read();
        if let Some(idx) = mgr.indexes.get_mut(&name) {
            for doc in store.docs.values() {
                match idx {
                    IndexImpl::Hash(h) => h.insert(&doc.data, &doc.id),
                    IndexImpl::BTree(b) => b.insert(&doc.data, &doc.id),
                }
            }
            idx.stats_mut().build_time_ms = start.elapsed().as_millis();
        }
        log::info!("built index {name} on {} over {} documents", self.name_str(), store.docs.len());
        Ok(name)
    }

    /// # Errors
    /// `NoSuchIndex` when no index has this name; the implicit `_id_` index cannot be dropped.
    pub fn drop_index(&self, name: &str) -> Result<(), DbError> {
        let _wguard = self.build_lock.write();
        if name == ID_INDEX_NAME {
            return Err(DbError::QueryError(format!("cannot drop {ID_INDEX_NAME}")));
        }
        if self.indexes.write().drop_index(name) {
            Ok(())
        } else {
            Err(DbError::NoSuchIndex(name.to_string()))
        }
    }

    /// Declared indexes, led by the implicit `_id_` entry.
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        let mut out = vec![IndexDescriptor {
            name: ID_INDEX_NAME.to_string(),
            spec: IndexSpec::ascending(crate::document::ID_FIELD).with_name(ID_INDEX_NAME),
        }];
        out.extend(self.indexes.read().descriptors());
        out
    }

    pub fn index_stats(&self, name: &str) -> Option<IndexStats> {
        self.indexes.read().indexes.get(name).map(|i| i.stats().clone())
    }
}
