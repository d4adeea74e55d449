use proptest::prelude::*;
use shelfdb::book::Book;
use shelfdb::books::Books;
use shelfdb::collection::Collection;
use std::collections::BTreeMap;
use std::sync::Arc;

fn library(years: &[i32]) -> Books<Arc<Collection>> {
    let books = Books::new(Arc::new(Collection::new("books")));
    let batch: Vec<Book> = years
        .iter()
        .enumerate()
        .map(|(i, y)| Book::new(format!("t{i}"), format!("a{}", i % 3), "Fiction", *y, 1.0, true))
        .collect();
    books.insert_many(&batch).unwrap();
    books
}

proptest! {
    #[test]
    fn prop_decades_bucket_every_book(years in proptest::collection::vec(-500i32..2100, 0..60)) {
        let lib = library(&years);
        let mut expected: BTreeMap<i64, u64> = BTreeMap::new();
        for y in &years {
            *expected.entry(i64::from(y.div_euclid(10))).or_default() += 1;
        }
        let got: Vec<(i64, u64)> = lib.count_by_decade().unwrap().into_iter().map(|d| (d.decade, d.count)).collect();
        prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_prolific_author_has_the_max_count(n in 0usize..30) {
        let years: Vec<i32> = (0..n).map(|i| 1900 + i32::try_from(i).unwrap()).collect();
        let lib = library(&years);
        let top = lib.most_prolific_author().unwrap();
        match n {
            0 => prop_assert!(top.is_none()),
            _ => {
                let top = top.unwrap();
                // a0 gets indices 0, 3, 6, ... and is seen first on ties
                prop_assert_eq!(top.author, "a0");
                prop_assert_eq!(top.books, u64::try_from(n.div_ceil(3)).unwrap());
            }
        }
    }
}
