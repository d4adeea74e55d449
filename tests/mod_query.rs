use bson::{Bson, doc};
use shelfdb::collection::Collection;
use shelfdb::document::Document;
use shelfdb::query::{
    Filter, FindOptions, Projection, Query, SortSpec, count_docs, delete_many, delete_one, find_docs,
    parse_filter_json, parse_projection_json, parse_sort_json, parse_update_json, update_many, update_one,
};
use shelfdb::utils::devlog;
use std::sync::Arc;

fn shelf() -> Arc<Collection> {
    let col = Arc::new(Collection::new("books"));
    for d in [
        doc! { "title": "1984", "author": "George Orwell", "genre": "Fiction", "published_year": 1949, "price": 9.99, "in_stock": true },
        doc! { "title": "Dune", "author": "Frank Herbert", "genre": "Science Fiction", "published_year": 1965, "price": 10.5, "in_stock": false },
        doc! { "title": "Sapiens", "author": "Yuval Noah Harari", "genre": "History", "published_year": 2011, "price": 18, "in_stock": true },
        doc! { "title": "Educated", "author": "Tara Westover", "genre": "Memoir", "published_year": 2018, "price": 16.75, "in_stock": true },
    ] {
        col.insert_document(Document::new(d)).unwrap();
    }
    col
}

fn titles(col: &Arc<Collection>, filter: &str) -> Vec<String> {
    let f = parse_filter_json(filter).unwrap();
    find_docs(col, &f, &FindOptions::default())
        .map(|d| d.data.get_str("title").unwrap().to_string())
        .collect()
}

#[test]
fn json_filters_match_mongo_semantics() {
    let col = shelf();
    assert_eq!(titles(&col, r#"{"genre":"Fiction"}"#), vec!["1984"]);
    assert_eq!(titles(&col, r#"{"published_year":{"$gt":2000}}"#), vec!["Sapiens", "Educated"]);
    assert_eq!(titles(&col, r#"{"in_stock":true,"published_year":{"$gt":2010}}"#), vec!["Sapiens", "Educated"]);
    assert_eq!(titles(&col, r#"{"price":{"$gte":10,"$lt":17}}"#), vec!["Dune", "Educated"]);
    assert_eq!(titles(&col, r#"{"$or":[{"genre":"Memoir"},{"title":"Dune"}]}"#), vec!["Dune", "Educated"]);
    assert_eq!(titles(&col, r#"{"genre":{"$in":["History","Memoir"]}}"#), vec!["Sapiens", "Educated"]);
    assert_eq!(titles(&col, r#"{"isbn":{"$exists":false}}"#).len(), 4);
    assert!(titles(&col, r#"{"title":"dune"}"#).is_empty());
    assert!(parse_filter_json(r#"{"$where":"1"}"#).is_err());
    assert!(parse_filter_json("[1]").is_err());
}

#[test]
fn int_and_double_compare_by_value() {
    let col = shelf();
    assert_eq!(titles(&col, r#"{"price":18.0}"#), vec!["Sapiens"]);
    assert_eq!(titles(&col, r#"{"published_year":1949.0}"#), vec!["1984"]);
}

#[test]
fn update_one_vs_many() {
    let col = shelf();
    let all = Filter::True;
    let upd = parse_update_json(r#"{"$inc":{"price":1}}"#).unwrap();
    let r = update_one(&col, &all, &upd).unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    let first = find_docs(&col, &parse_filter_json(r#"{"title":"1984"}"#).unwrap(), &FindOptions::default())
        .next()
        .unwrap();
    assert!((first.data.get_f64("price").unwrap() - 10.99).abs() < 1e-9);

    let r = update_many(&col, &all, &parse_update_json(r#"{"$set":{"in_stock":false}}"#).unwrap()).unwrap();
    assert_eq!((r.matched, r.modified), (4, 3));
    assert_eq!(count_docs(&col, &parse_filter_json(r#"{"in_stock":true}"#).unwrap()), 0);
}

#[test]
fn update_documents_are_validated() {
    assert!(parse_update_json(r#"{"price":1}"#).is_err());
    assert!(parse_update_json(r#"{"$rename":{"a":"b"}}"#).is_err());
    assert!(parse_update_json(r#"{"$set":{"_id":"x"}}"#).is_err());
    assert!(parse_update_json(r#"{"$set":{"price":1},"$unset":{"price":""}}"#).is_err());
    assert!(parse_update_json(r#"{}"#).is_err());
}

#[test]
fn unset_and_mul() {
    let col = shelf();
    let f = parse_filter_json(r#"{"title":"Dune"}"#).unwrap();
    update_one(&col, &f, &parse_update_json(r#"{"$mul":{"price":2},"$unset":{"in_stock":""}}"#).unwrap()).unwrap();
    let d = find_docs(&col, &f, &FindOptions::default()).next().unwrap();
    assert!((d.data.get_f64("price").unwrap() - 21.0).abs() < 1e-9);
    assert!(!d.data.contains_key("in_stock"));
}

#[test]
fn delete_one_removes_first_match_only() {
    let col = shelf();
    let f = parse_filter_json(r#"{"in_stock":true}"#).unwrap();
    assert_eq!(delete_one(&col, &f).deleted, 1);
    assert_eq!(titles(&col, r#"{"in_stock":true}"#), vec!["Sapiens", "Educated"]);
    assert_eq!(delete_many(&col, &f).deleted, 2);
    assert_eq!(delete_many(&col, &f).deleted, 0);
    assert_eq!(col.len(), 1);
}

#[test]
fn projection_sort_and_paging_from_json() {
    let col = shelf();
    let opts = FindOptions {
        projection: parse_projection_json(r#"{"title":1,"price":1,"_id":0}"#).unwrap(),
        sort: Some(parse_sort_json(r#"{"price":-1}"#).unwrap()),
        skip: Some(1),
        limit: Some(2),
    };
    let docs = find_docs(&col, &Filter::True, &opts).into_data();
    assert_eq!(docs, vec![doc! { "title": "Educated", "price": 16.75 }, doc! { "title": "Dune", "price": 10.5 }]);
    assert!(parse_projection_json(r#"{"title":1,"price":0}"#).is_err());
}

#[test]
fn exclusion_projection_keeps_other_fields() {
    let col = shelf();
    let opts = FindOptions::new().project(Projection::Exclude { fields: vec!["in_stock".into(), "_id".into()] });
    let d = &find_docs(&col, &Filter::eq("title", "1984"), &opts).into_data()[0];
    assert_eq!(d.keys().cloned().collect::<Vec<_>>(), vec!["title", "author", "genre", "published_year", "price"]);
}

#[test]
fn sort_places_missing_fields_first() {
    let col = shelf();
    col.insert_document(Document::new(doc! { "title": "Untitled" })).unwrap();
    let opts = FindOptions::new().sort(SortSpec::asc("price"));
    let first = find_docs(&col, &Filter::True, &opts).next().unwrap();
    assert_eq!(first.data.get_str("title").unwrap(), "Untitled");
}

#[test]
fn query_builder_runs_and_explains() {
    let col = shelf();
    let q = Query::new(Filter::gt("published_year", 1950)).sort_asc("price").limit(2);
    let got: Vec<Bson> = q.run(&col).map(|d| d.data.get("title").cloned().unwrap()).collect();
    assert_eq!(got, vec![Bson::from("Dune"), Bson::from("Educated")]);
    assert_eq!(q.explain(&col, Default::default()).stage(), "COLLSCAN");
}

#[test]
fn find_emits_dev6_benchmark_line() {
    let col = shelf();
    let _guard = devlog::enable_thread_sink();
    let _ = find_docs(&col, &Filter::True, &FindOptions::new().limit(3)).to_vec();
    let _ = count_docs(&col, &Filter::True);
    let lines = devlog::drain_json();
    assert!(lines.iter().any(|v| v["op"] == "find" && v["result_count"] == 3 && v["collection"] == "books"));
    assert!(lines.iter().any(|v| v["op"] == "count" && v["result_count"] == 4));
}

#[test]
fn oversized_in_list_is_an_error_not_a_narrower_query() {
    let col = Arc::new(Collection::new("nums"));
    col.insert_document(Document::new(doc! { "x": 1000 })).unwrap();
    let values: Vec<String> = (0..=1000).map(|n| n.to_string()).collect();
    let json = format!(r#"{{"x":{{"$in":[{}]}}}}"#, values.join(","));
    assert!(parse_filter_json(&json).is_err());

    let within = format!(r#"{{"x":{{"$in":[{}]}}}}"#, values[1..].join(","));
    let f = parse_filter_json(&within).unwrap();
    assert_eq!(count_docs(&col, &f), 1);
    // lists built in code are not cut short either
    let built = Filter::one_of("x", (0..=2000).map(Bson::from));
    assert_eq!(count_docs(&col, &built), 1);
}
