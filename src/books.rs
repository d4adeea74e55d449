//! Typed surface over a `books` collection: the canned statements as methods.
use crate::aggregate::{Accumulator, Expr, GroupStage, Pipeline};
use crate::book::{Book, BookSummary};
use crate::errors::DbError;
use crate::explain::{ExplainReport, Verbosity};
use crate::index::IndexSpec;
use crate::query::{
    DeleteReport, Filter, FindOptions, Order, Projection, SortSpec, UpdateDoc, UpdateReport, to_f64,
};
use crate::store::DocumentStore;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use serde::Serialize;

pub const COLLECTION: &str = "books";
pub const PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreAverage {
    pub genre: String,
    /// `None` when no book in the genre has a numeric price.
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorCount {
    pub author: String,
    pub books: u64,
}

/// `decade` is the bucket key `floor(published_year / 10)`, so 1949 lands in 194.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecadeCount {
    pub decade: i64,
    pub count: u64,
}

pub fn by_genre_filter(genre: &str) -> Filter {
    Filter::eq("genre", genre)
}

#[must_use]
pub fn published_after_filter(year: i32) -> Filter {
    Filter::gt("published_year", year)
}

pub fn by_author_filter(author: &str) -> Filter {
    Filter::eq("author", author)
}

pub fn by_title_filter(title: &str) -> Filter {
    Filter::eq("title", title)
}

#[must_use]
pub fn in_stock_published_after_filter(year: i32) -> Filter {
    Filter::eq("in_stock", true).and(published_after_filter(year))
}

#[must_use]
pub fn summary_projection() -> Projection {
    Projection::include_without_id(["title", "author", "price"])
}

#[must_use]
pub fn average_price_by_genre_pipeline() -> Pipeline {
    Pipeline::new()
        .group(GroupStage::by(Expr::field("genre")).with("average_price", Accumulator::Avg(Expr::field("price"))))
}

#[must_use]
pub fn most_prolific_author_pipeline() -> Pipeline {
    Pipeline::new()
        .group(GroupStage::by(Expr::field("author")).with("count", Accumulator::count()))
        .sort(vec![SortSpec::desc("count")])
        .limit(1)
}

#[must_use]
pub fn count_by_decade_pipeline() -> Pipeline {
    Pipeline::new()
        .group(
            GroupStage::by(Expr::floor(Expr::divide(Expr::field("published_year"), Expr::lit(10))))
                .with("count", Accumulator::count()),
        )
        .sort(vec![SortSpec::asc("_id")])
}

#[must_use]
pub fn title_index() -> IndexSpec {
    IndexSpec::ascending("title")
}

#[must_use]
pub fn author_year_index() -> IndexSpec {
    IndexSpec::compound([("author", Order::Asc), ("published_year", Order::Desc)])
}

/// A small catalogue for demos and smoke tests. Orwell and Austen tie on book count.
#[must_use]
pub fn sample_books() -> Vec<Book> {
    vec![
        Book::new("1984", "George Orwell", "Fiction", 1949, 9.99, true),
        Book::new("Animal Farm", "George Orwell", "Fiction", 1945, 7.5, true),
        Book::new("Pride and Prejudice", "Jane Austen", "Romance", 1813, 6.99, false),
        Book::new("Emma", "Jane Austen", "Romance", 1815, 8.25, true),
        Book::new("Neuromancer", "William Gibson", "Science Fiction", 1984, 12.0, true),
        Book::new("The Road", "Cormac McCarthy", "Fiction", 2006, 14.5, false),
        Book::new("Sapiens", "Yuval Noah Harari", "History", 2011, 18.0, true),
        Book::new("The Martian", "Andy Weir", "Science Fiction", 2011, 11.0, true),
        Book::new("Dune", "Frank Herbert", "Science Fiction", 1965, 10.5, true),
        Book::new("Educated", "Tara Westover", "Memoir", 2018, 16.75, true),
        Book::new("The Kite Runner", "Khaled Hosseini", "Fiction", 2003, 13.25, false),
        Book::new("Beloved", "Toni Morrison", "Fiction", 1987, 12.75, true),
    ]
}

/// Typed wrapper over any [`DocumentStore`] holding books.
#[derive(Debug, Clone)]
pub struct Books<S> {
    store: S,
}

impl<S: DocumentStore> Books<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// # Errors
    /// Propagates store insert failures.
    pub fn insert_many(&self, books: &[Book]) -> Result<Vec<DocumentId>, DbError> {
        self.store.insert_many(books.iter().map(Book::to_document).collect())
    }

    fn find_books(&self, filter: &Filter, opts: &FindOptions) -> Result<Vec<Book>, DbError> {
        self.store.find(filter, opts)?.iter().map(Book::from_document).collect()
    }

    /// `find({genre})`
    ///
    /// # Errors
    /// `InvalidDocument` when a stored record is not a book.
    pub fn by_genre(&self, genre: &str) -> Result<Vec<Book>, DbError> {
        self.find_books(&by_genre_filter(genre), &FindOptions::default())
    }

    /// `find({published_year: {$gt: year}})`
    ///
    /// # Errors
    /// See [`Books::by_genre`].
    pub fn published_after(&self, year: i32) -> Result<Vec<Book>, DbError> {
        self.find_books(&published_after_filter(year), &FindOptions::default())
    }

    /// # Errors
    /// See [`Books::by_genre`].
    pub fn by_author(&self, author: &str) -> Result<Vec<Book>, DbError> {
        self.find_books(&by_author_filter(author), &FindOptions::default())
    }

    /// `updateOne({title}, {$set: {price}})`
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn set_price(&self, title: &str, price: f64) -> Result<UpdateReport, DbError> {
        self.store.update_one(&by_title_filter(title), &UpdateDoc::set("price", price))
    }

    /// `deleteOne({title})`
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn delete_by_title(&self, title: &str) -> Result<DeleteReport, DbError> {
        self.store.delete_one(&by_title_filter(title))
    }

    /// # Errors
    /// See [`Books::by_genre`].
    pub fn in_stock_published_after(&self, year: i32) -> Result<Vec<Book>, DbError> {
        self.find_books(&in_stock_published_after_filter(year), &FindOptions::default())
    }

    /// All books projected to `{title, author, price}` without `_id`.
    ///
    /// # Errors
    /// See [`Books::by_genre`].
    pub fn summaries(&self) -> Result<Vec<BookSummary>, DbError> {
        let opts = FindOptions::new().project(summary_projection());
        self.store.find(&Filter::True, &opts)?.iter().map(BookSummary::from_document).collect()
    }

    /// # Errors
    /// See [`Books::by_genre`].
    pub fn sorted_by_price(&self, order: Order) -> Result<Vec<Book>, DbError> {
        let opts = FindOptions::new().sort(SortSpec { field: "price".into(), order });
        self.find_books(&Filter::True, &opts)
    }

    /// `find().skip(skip).limit(limit)` in natural order.
    ///
    /// # Errors
    /// See [`Books::by_genre`].
    pub fn page(&self, skip: usize, limit: usize) -> Result<Vec<Book>, DbError> {
        self.find_books(&Filter::True, &FindOptions::new().skip(skip).limit(limit))
    }

    /// # Errors
    /// Propagates aggregation failures.
    pub fn average_price_by_genre(&self) -> Result<Vec<GenreAverage>, DbError> {
        let rows = self.store.aggregate(&average_price_by_genre_pipeline())?;
        Ok(rows
            .iter()
            .map(|r| GenreAverage {
                genre: group_label(r),
                average_price: r.get("average_price").and_then(to_f64),
            })
            .collect())
    }

    /// Author with the most books; ties go to the author seen first.
    ///
    /// # Errors
    /// Propagates aggregation failures.
    pub fn most_prolific_author(&self) -> Result<Option<AuthorCount>, DbError> {
        let rows = self.store.aggregate(&most_prolific_author_pipeline())?;
        Ok(rows.first().map(|r| AuthorCount { author: group_label(r), books: count_of(r) }))
    }

    /// # Errors
    /// Propagates aggregation failures; `InvalidDocument` for non-numeric bucket keys.
    #[allow(clippy::cast_possible_truncation)]
    pub fn count_by_decade(&self) -> Result<Vec<DecadeCount>, DbError> {
        let rows = self.store.aggregate(&count_by_decade_pipeline())?;
        rows.iter()
            .map(|r| {
                let decade = r
                    .get("_id")
                    .and_then(to_f64)
                    .ok_or_else(|| DbError::InvalidDocument("book without a numeric published_year".into()))?;
                Ok(DecadeCount { decade: decade as i64, count: count_of(r) })
            })
            .collect()
    }

    /// `createIndex({title: 1})`
    ///
    /// # Errors
    /// `IndexConflict` when `title_1` exists with other keys.
    pub fn create_title_index(&self) -> Result<String, DbError> {
        self.store.create_index(title_index())
    }

    /// `createIndex({author: 1, published_year: -1})`
    ///
    /// # Errors
    /// `IndexConflict` when the name exists with other keys.
    pub fn create_author_year_index(&self) -> Result<String, DbError> {
        self.store.create_index(author_year_index())
    }

    /// `find({title}).explain("executionStats")`
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn explain_title(&self, title: &str) -> Result<ExplainReport, DbError> {
        self.store.explain(&by_title_filter(title), &FindOptions::default(), Verbosity::ExecutionStats)
    }
}

fn group_label(row: &BsonDocument) -> String {
    match row.get("_id") {
        Some(Bson::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_of(row: &BsonDocument) -> u64 {
    row.get("count").and_then(to_f64).map_or(0, |f| f.max(0.0) as u64)
}
