use super::core::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::index::{index_insert_all, index_remove_all};
use crate::query::telemetry;
use crate::types::DocumentId;
use crate::utils::num::usize_to_u64;
use std::collections::BTreeMap;

impl Collection {
    /// Store a document at the end of natural order and index it.
    ///
    /// # Errors
    /// `InvalidDocument` when a document with the same id is already stored.
    pub fn insert_document(&self, document: Document) -> Result<DocumentId, DbError> {
        let _guard = self.build_lock.read();
        let doc_id = document.id.clone();
        {
            let mut store = self.store.write();
            let data = document.data.clone();
            store.push(document)?;
            index_insert_all(&mut self.indexes.write(), &data, &doc_id);
        }
        telemetry::log_audit("insert", &self.name_str(), &doc_id.to_string());
        Ok(doc_id)
    }

    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.store.read().get(id).cloned()
    }

    pub fn delete_document(&self, id: &DocumentId) -> bool {
        let _guard = self.build_lock.read();
        let removed = {
            let mut store = self.store.write();
            store.remove(id).inspect(|old| index_remove_all(&mut self.indexes.write(), &old.data, id))
        };
        if removed.is_some() {
            telemetry::log_audit("delete", &self.name_str(), &id.to_string());
        }
        removed.is_some()
    }

    /// All documents in natural order.
    pub fn get_all_documents(&self) -> Vec<Document> {
        self.store.read().docs.values().cloned().collect()
    }

    /// Return only the IDs of all documents (natural order) without cloning each document.
    pub fn list_ids(&self) -> Vec<DocumentId> {
        self.store.read().docs.values().map(|d| d.id.clone()).collect()
    }

    /// Sort ids into natural order, dropping duplicates and ids no longer stored.
    pub fn natural_order(&self, ids: Vec<DocumentId>) -> Vec<DocumentId> {
        let store = self.store.read();
        let mut seqs: Vec<(u64, DocumentId)> =
            ids.into_iter().filter_map(|id| store.positions.get(&id).map(|s| (*s, id))).collect();
        seqs.sort_by_key(|(s, _)| *s);
        seqs.dedup_by_key(|(s, _)| *s);
        seqs.into_iter().map(|(_, id)| id).collect()
    }

    /// Select documents with `pred` and mutate them with `f`, both under one write lock, so a
    /// concurrent writer cannot change a document between its selection and its update.
    /// Visits natural order and stops after the first match when `first_only`. Returns
    /// `(matched, modified)`; an `Err` stops the walk and keeps earlier modifications.
    pub(crate) fn modify_matching<P, F, E>(&self, first_only: bool, mut pred: P, mut f: F) -> Result<(u64, u64), E>
    where
        P: FnMut(&Document) -> bool,
        F: FnMut(&mut Document) -> Result<bool, E>,
    {
        let _guard = self.build_lock.read();
        let mut changed = Vec::new();
        let mut matched = 0u64;
        let res = {
            let mut store = self.store.write();
            let seqs = selected_seqs(&store.docs, first_only, &mut pred);
            let mut res = Ok(());
            for seq in seqs {
                let Some(doc) = store.docs.get_mut(&seq) else { continue };
                matched += 1;
                match self.rewrite(doc, &mut f) {
                    Ok(true) => changed.push(doc.id.clone()),
                    Ok(false) => {}
                    Err(e) => {
                        res = Err(e);
                        break;
                    }
                }
            }
            res
        };
        let name = self.name_str();
        for id in &changed {
            telemetry::log_audit("update", &name, &id.to_string());
        }
        res.map(|()| (matched, usize_to_u64(changed.len())))
    }

    /// Remove documents selected by `pred` under one write lock. Returns how many were removed.
    pub(crate) fn delete_matching<P>(&self, first_only: bool, mut pred: P) -> u64
    where
        P: FnMut(&Document) -> bool,
    {
        let _guard = self.build_lock.read();
        let removed: Vec<Document> = {
            let mut store = self.store.write();
            let seqs = selected_seqs(&store.docs, first_only, &mut pred);
            let mut mgr = self.indexes.write();
            seqs.into_iter()
                .filter_map(|seq| store.remove_seq(seq))
                .inspect(|old| index_remove_all(&mut mgr, &old.data, &old.id))
                .collect()
        };
        let name = self.name_str();
        for old in &removed {
            telemetry::log_audit("delete", &name, &old.id.to_string());
        }
        usize_to_u64(removed.len())
    }

    /// Apply `f` to a copy of `doc`; on a reported change swap it in and refresh the indexes.
    fn rewrite<F, E>(&self, doc: &mut Document, f: F) -> Result<bool, E>
    where
        F: FnOnce(&mut Document) -> Result<bool, E>,
    {
        let mut working = doc.clone();
        let changed = f(&mut working)?;
        if changed {
            let mut mgr = self.indexes.write();
            index_remove_all(&mut mgr, &doc.data, &doc.id);
            index_insert_all(&mut mgr, &working.data, &working.id);
            *doc = working;
        }
        Ok(changed)
    }
}

fn selected_seqs<P>(docs: &BTreeMap<u64, Document>, first_only: bool, pred: &mut P) -> Vec<u64>
where
    P: FnMut(&Document) -> bool,
{
    let hits = docs.iter().filter(|&(_, d)| pred(d)).map(|(seq, _)| *seq);
    if first_only { hits.take(1).collect() } else { hits.collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn natural_order_is_insertion_order() {
        let col = Collection::new("c");
        let a = col.insert_document(Document::new(doc! { "n": 1 })).unwrap();
        let b = col.insert_document(Document::new(doc! { "n": 2 })).unwrap();
        let c = col.insert_document(Document::new(doc! { "n": 3 })).unwrap();
        assert_eq!(col.list_ids(), vec![a.clone(), b.clone(), c.clone()]);
        assert!(col.delete_document(&b));
        assert!(!col.delete_document(&b));
        assert_eq!(col.natural_order(vec![c.clone(), a.clone(), c.clone(), b]), vec![a, c]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let col = Collection::new("c");
        let d = Document::new(doc! { "n": 1 });
        col.insert_document(d.clone()).unwrap();
        assert!(matches!(col.insert_document(d), Err(DbError::InvalidDocument(_))));
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn failed_modification_leaves_document_untouched() {
        let col = Collection::new("c");
        let id = col.insert_document(Document::new(doc! { "n": 1 })).unwrap();
        let res = col.modify_matching(true, |_| true, |d| {
            d.data.insert("n", 2);
            Err::<bool, _>("nope")
        });
        assert_eq!(res, Err("nope"));
        assert_eq!(col.find_document(&id).unwrap().data.get_i32("n").unwrap(), 1);
    }

    #[test]
    fn body_ids_are_unique_whatever_their_type() {
        let col = Collection::new("c");
        col.insert_document(Document::new(doc! { "_id": "book-1", "title": "A" })).unwrap();
        let again = col.insert_document(Document::new(doc! { "_id": "book-1", "title": "B" }));
        assert!(matches!(again, Err(DbError::InvalidDocument(_))));

        col.insert_document(Document::new(doc! { "_id": 7, "title": "C" })).unwrap();
        // numeric ids compare by value
        assert!(col.insert_document(Document::new(doc! { "_id": 7.0, "title": "D" })).is_err());
        col.insert_document(Document::new(doc! { "_id": { "isbn": "x" }, "title": "E" })).unwrap();
        assert!(col.insert_document(Document::new(doc! { "_id": { "isbn": "x" }, "title": "F" })).is_err());
        assert_eq!(col.len(), 3);

        // a freed id can be reused
        assert_eq!(col.delete_matching(true, |d| d.data.get_str("title").is_ok_and(|t| t == "A")), 1);
        col.insert_document(Document::new(doc! { "_id": "book-1", "title": "G" })).unwrap();
        assert_eq!(col.len(), 3);
    }

    #[test]
    fn matching_walk_honours_first_only() {
        let col = Collection::new("c");
        for n in [1, 2, 1, 1] {
            col.insert_document(Document::new(doc! { "n": n })).unwrap();
        }
        let ones = |d: &Document| d.data.get_i32("n").is_ok_and(|n| n == 1);
        let bump = |d: &mut Document| -> Result<bool, DbError> {
            d.data.insert("seen", true);
            Ok(true)
        };
        assert_eq!(col.modify_matching(true, ones, bump).unwrap(), (1, 1));
        assert_eq!(col.modify_matching(false, ones, bump).unwrap(), (3, 3));
        assert_eq!(col.delete_matching(false, ones), 3);
        assert_eq!(col.len(), 1);
    }
}
