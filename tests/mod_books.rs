use shelfdb::book::Book;
use shelfdb::books::{Books, sample_books};
use shelfdb::collection::Collection;
use shelfdb::query::Order;
use std::sync::Arc;

fn library() -> Books<Arc<Collection>> {
    let books = Books::new(Arc::new(Collection::new("books")));
    books.insert_many(&sample_books()).unwrap();
    books
}

fn titles(v: &[Book]) -> Vec<&str> {
    v.iter().map(|b| b.title.as_str()).collect()
}

#[test]
fn filters_by_genre_year_and_author() {
    let lib = library();
    assert_eq!(
        titles(&lib.by_genre("Fiction").unwrap()),
        vec!["1984", "Animal Farm", "The Road", "The Kite Runner", "Beloved"]
    );
    assert_eq!(
        titles(&lib.published_after(2000).unwrap()),
        vec!["The Road", "Sapiens", "The Martian", "Educated", "The Kite Runner"]
    );
    assert_eq!(titles(&lib.by_author("George Orwell").unwrap()), vec!["1984", "Animal Farm"]);
    assert!(lib.by_genre("fiction").unwrap().is_empty());
}

#[test]
fn set_price_touches_only_the_first_match() {
    let lib = library();
    lib.insert_many(&[Book::new("1984", "Someone Else", "Fiction", 1990, 3.0, true)]).unwrap();
    let r = lib.set_price("1984", 15.99).unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    let prices: Vec<f64> =
        lib.sorted_by_price(Order::Asc).unwrap().iter().filter(|b| b.title == "1984").map(|b| b.price).collect();
    assert_eq!(prices, vec![3.0, 15.99]);

    let none = lib.set_price("Missing", 1.0).unwrap();
    assert_eq!((none.matched, none.modified), (0, 0));
}

#[test]
fn delete_by_title_shrinks_by_one_iff_present() {
    let lib = library();
    let before = lib.store().len();
    assert_eq!(lib.delete_by_title("Dune").unwrap().deleted, 1);
    assert_eq!(lib.store().len(), before - 1);
    assert_eq!(lib.delete_by_title("Dune").unwrap().deleted, 0);
    assert_eq!(lib.store().len(), before - 1);
}

#[test]
fn in_stock_and_recent() {
    let lib = library();
    assert_eq!(titles(&lib.in_stock_published_after(2010).unwrap()), vec!["Sapiens", "The Martian", "Educated"]);
}

#[test]
fn summaries_hold_three_fields() {
    let lib = library();
    let s = lib.summaries().unwrap();
    assert_eq!(s.len(), sample_books().len());
    assert_eq!(s[0].title, "1984");
    assert_eq!(s[0].author, "George Orwell");
    assert!((s[0].price - 9.99).abs() < f64::EPSILON);
}

#[test]
fn price_sorts_are_mirror_images() {
    let lib = library();
    let asc: Vec<String> = lib.sorted_by_price(Order::Asc).unwrap().into_iter().map(|b| b.title).collect();
    let mut desc: Vec<String> = lib.sorted_by_price(Order::Desc).unwrap().into_iter().map(|b| b.title).collect();
    desc.reverse();
    assert_eq!(asc, desc);
    assert_eq!(asc[0], "Pride and Prejudice");
}

#[test]
fn pages_concatenate_to_the_first_ten() {
    let lib = library();
    let mut pages = lib.page(0, 5).unwrap();
    pages.extend(lib.page(5, 5).unwrap());
    assert_eq!(pages, lib.page(0, 10).unwrap());
    assert_eq!(lib.page(10, 5).unwrap().len(), 2);
    assert!(lib.page(50, 5).unwrap().is_empty());
}

#[test]
fn aggregations() {
    let lib = library();
    let avgs = lib.average_price_by_genre().unwrap();
    assert_eq!(avgs.len(), 5);
    let romance = avgs.iter().find(|g| g.genre == "Romance").unwrap();
    assert!((romance.average_price.unwrap() - 7.62).abs() < 1e-9);

    let top = lib.most_prolific_author().unwrap().unwrap();
    assert_eq!((top.author.as_str(), top.books), ("George Orwell", 2));

    let decades: Vec<(i64, u64)> = lib.count_by_decade().unwrap().iter().map(|d| (d.decade, d.count)).collect();
    assert_eq!(decades, vec![(181, 2), (194, 2), (196, 1), (198, 2), (200, 2), (201, 3)]);
}

#[test]
fn indexes_and_explain() {
    let lib = library();
    assert_eq!(lib.explain_title("1984").unwrap().stage(), "COLLSCAN");
    assert_eq!(lib.create_title_index().unwrap(), "title_1");
    assert_eq!(lib.create_title_index().unwrap(), "title_1");
    assert_eq!(lib.create_author_year_index().unwrap(), "author_1_published_year_-1");

    let report = lib.explain_title("1984").unwrap();
    assert_eq!(report.stage(), "FETCH");
    assert_eq!(report.index_name(), Some("title_1"));
    let stats = report.execution_stats.unwrap();
    assert_eq!(stats.n_returned, 1);
    assert_eq!(stats.total_docs_examined, 1);
    assert_eq!(stats.total_keys_examined, 1);
}

#[test]
fn empty_collection_edges() {
    let lib = Books::new(Arc::new(Collection::new("books")));
    assert!(lib.most_prolific_author().unwrap().is_none());
    assert!(lib.average_price_by_genre().unwrap().is_empty());
    assert!(lib.count_by_decade().unwrap().is_empty());
    assert_eq!(lib.explain_title("1984").unwrap().execution_stats.unwrap().n_returned, 0);
}
