use crate::errors::DbError;
use crate::query::to_f64;
use bson::{Bson, Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};

/// A record of the `books` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        published_year: i32,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Self { title: title.into(), author: author.into(), genre: genre.into(), published_year, price, in_stock }
    }

    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        doc! {
            "title": self.title.as_str(),
            "author": self.author.as_str(),
            "genre": self.genre.as_str(),
            "published_year": self.published_year,
            "price": self.price,
            "in_stock": self.in_stock,
        }
    }

    /// Read a book back from a stored document. Integral doubles are accepted for the year.
    ///
    /// # Errors
    /// `InvalidDocument` when a field is missing or has the wrong type.
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        Ok(Self {
            title: string_field(doc, "title")?,
            author: string_field(doc, "author")?,
            genre: string_field(doc, "genre")?,
            published_year: year_field(doc)?,
            price: to_f64(field(doc, "price")?).ok_or_else(|| wrong_type("price", "a number"))?,
            in_stock: match field(doc, "in_stock")? {
                Bson::Boolean(b) => *b,
                _ => return Err(wrong_type("in_stock", "a boolean")),
            },
        })
    }
}

/// The `{title, author, price}` projection of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    pub price: f64,
}

impl BookSummary {
    /// # Errors
    /// `InvalidDocument` when a projected field is missing.
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        Ok(Self {
            title: string_field(doc, "title")?,
            author: string_field(doc, "author")?,
            price: to_f64(field(doc, "price")?).ok_or_else(|| wrong_type("price", "a number"))?,
        })
    }
}

fn field<'a>(doc: &'a BsonDocument, name: &str) -> Result<&'a Bson, DbError> {
    doc.get(name).ok_or_else(|| DbError::InvalidDocument(format!("book is missing {name}")))
}

fn wrong_type(name: &str, expected: &str) -> DbError {
    DbError::InvalidDocument(format!("book field {name} must be {expected}"))
}

fn string_field(doc: &BsonDocument, name: &str) -> Result<String, DbError> {
    match field(doc, name)? {
        Bson::String(s) => Ok(s.clone()),
        _ => Err(wrong_type(name, "a string")),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn year_field(doc: &BsonDocument) -> Result<i32, DbError> {
    let bad = || wrong_type("published_year", "an integer year");
    match field(doc, "published_year")? {
        Bson::Int32(y) => Ok(*y),
        Bson::Int64(y) => i32::try_from(*y).map_err(|_| bad()),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX) => Ok(*f as i32),
        _ => Err(bad()),
    }
}
