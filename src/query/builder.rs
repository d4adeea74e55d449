//! Fluent construction of filters and find options.
use bson::Bson;
use std::sync::Arc;

use super::cursor::Cursor;
use super::exec::{explain_find, find_docs};
use super::types::{CmpOp, Filter, FindOptions, Projection, SortSpec};
use crate::collection::Collection;
use crate::explain::{ExplainReport, Verbosity};

impl Filter {
    pub fn ne(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::cmp(path, CmpOp::Ne, value)
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::cmp(path, CmpOp::Gt, value)
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::cmp(path, CmpOp::Gte, value)
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::cmp(path, CmpOp::Lt, value)
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::cmp(path, CmpOp::Lte, value)
    }

    pub fn one_of<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Self::In { path: path.into(), values: values.into_iter().map(Into::into).collect() }
    }

    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Self::Exists { path: path.into(), exists }
    }

    /// Conjunction; nested `And`s are flattened and `True` operands dropped.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f {
                Self::True => {}
                Self::And(fs) => parts.extend(fs),
                f => parts.push(f),
            }
        }
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut fs) => {
                fs.push(other);
                Self::Or(fs)
            }
            f => Self::Or(vec![f, other]),
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key; earlier keys take precedence.
    #[must_use]
    pub fn sort(mut self, spec: SortSpec) -> Self {
        self.sort.get_or_insert_with(Vec::new).push(spec);
        self
    }

    #[must_use]
    pub const fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// A filter with its find options, bound to a collection when run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub options: FindOptions,
}

impl Default for Filter {
    fn default() -> Self {
        Self::True
    }
}

impl Query {
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self { filter, options: FindOptions::default() }
    }

    #[must_use]
    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.options = self.options.sort(SortSpec::asc(field));
        self
    }

    #[must_use]
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.options = self.options.sort(SortSpec::desc(field));
        self
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.options = self.options.skip(n);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.options = self.options.limit(n);
        self
    }

    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.options = self.options.project(projection);
        self
    }

    pub fn run(&self, col: &Arc<Collection>) -> Cursor {
        find_docs(col, &self.filter, &self.options)
    }

    pub fn explain(&self, col: &Arc<Collection>, verbosity: Verbosity) -> ExplainReport {
        explain_find(col, &self.filter, &self.options, verbosity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use bson::doc;

    #[test]
    fn and_flattens_and_drops_true() {
        let f = Filter::True.and(Filter::eq("a", 1)).and(Filter::gt("b", 2));
        assert_eq!(f, Filter::And(vec![Filter::eq("a", 1), Filter::gt("b", 2)]));
        assert_eq!(Filter::True.and(Filter::True), Filter::True);
    }

    #[test]
    fn query_builder_pages_a_sorted_collection() {
        let col = Arc::new(Collection::new("u_builder"));
        for p in [5.0, 1.0, 3.0, 2.0, 4.0] {
            col.insert_document(Document::new(doc! { "price": p })).unwrap();
        }
        let prices: Vec<f64> = Query::new(Filter::True)
            .sort_desc("price")
            .skip(1)
            .limit(2)
            .run(&col)
            .map(|d| d.data.get_f64("price").unwrap())
            .collect();
        assert_eq!(prices, vec![4.0, 3.0]);
    }
}
