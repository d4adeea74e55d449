use bson::doc;
use shelfdb::collection::Collection;
use shelfdb::document::Document;
use shelfdb::query::{Filter, count_docs, delete_one, parse_update_json, update_one};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const DOCS: usize = 400;

fn copies_of_1984() -> Arc<Collection> {
    let col = Arc::new(Collection::new("books"));
    for n in 0..DOCS {
        col.insert_document(Document::new(doc! { "title": "1984", "copy": n as i64, "state": "new" })).unwrap();
    }
    col
}

#[test]
fn delete_one_never_misses_while_matches_remain() {
    let col = copies_of_1984();
    let filter = Filter::eq("title", "1984");

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let col = col.clone();
        let filter = filter.clone();
        handles.push(thread::spawn(move || {
            let mut deleted = 0u64;
            loop {
                let r = delete_one(&col, &filter);
                if r.deleted == 0 {
                    // nothing is ever inserted, so an empty answer must be final
                    assert_eq!(count_docs(&col, &filter), 0);
                    return deleted;
                }
                deleted += r.deleted;
            }
        }));
    }

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, DOCS as u64);
    assert!(col.is_empty());
}

#[test]
fn update_one_claims_each_document_once() {
    let col = copies_of_1984();
    let unclaimed = Filter::eq("state", "new");

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let col = col.clone();
        let unclaimed = unclaimed.clone();
        let claim = parse_update_json(&format!(r#"{{"$set":{{"state":"claimed","by":{t}}}}}"#)).unwrap();
        handles.push(thread::spawn(move || {
            let mut claimed = 0u64;
            loop {
                let r = update_one(&col, &unclaimed, &claim).unwrap();
                if r.matched == 0 {
                    assert_eq!(count_docs(&col, &unclaimed), 0);
                    return claimed;
                }
                // the matched document still satisfied the filter when it was written
                assert_eq!(r.modified, 1);
                claimed += 1;
            }
        }));
    }

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, DOCS as u64);
    assert_eq!(count_docs(&col, &Filter::eq("state", "claimed")), DOCS);
}
