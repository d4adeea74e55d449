use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, Projection, SortSpec};
use crate::document::ID_FIELD;

#[must_use]
pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Nin { path, values } => !get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op: CmpOp::Ne, value } => {
            !get_path(doc, path).is_some_and(|v| matches_cmp(v, CmpOp::Eq, value))
        }
        Filter::Cmp { path, op, value } => {
            get_path(doc, path).is_some_and(|v| matches_cmp(v, *op, value))
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            if let Some(Bson::String(s)) = get_path(doc, path) {
                let mut re = regex::RegexBuilder::new(pattern);
                re.case_insensitive(*case_insensitive);
                re.build().is_ok_and(|r| r.is_match(s))
            } else {
                false
            }
        }
    }
}

/// Compare a stored value against a predicate operand. Arrays match when any element does.
fn matches_cmp(v: &Bson, op: CmpOp, operand: &Bson) -> bool {
    if let Bson::Array(items) = v
        && !matches!(operand, Bson::Array(_))
    {
        return items.iter().any(|x| matches_cmp(x, op, operand));
    }
    match op {
        CmpOp::Eq => values_equal(v, operand),
        CmpOp::Ne => !values_equal(v, operand),
        CmpOp::Gt => comparable_cmp(v, operand) == Some(Ordering::Greater),
        CmpOp::Gte => comparable_cmp(v, operand).is_some_and(|o| o != Ordering::Less),
        CmpOp::Lt => comparable_cmp(v, operand) == Some(Ordering::Less),
        CmpOp::Lte => comparable_cmp(v, operand).is_some_and(|o| o != Ordering::Greater),
    }
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().any(|x| matches_cmp(v, CmpOp::Eq, x))
}

/// Ordering between values of the same type bracket; `None` when the brackets differ.
fn comparable_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[allow(clippy::float_cmp)]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (to_f64(a), to_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn to_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Total order used for sorting: values of different types order by type rank.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let o = compare_bson(l, r);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) | Bson::Timestamp(_) => 8,
        _ => 9,
    }
}

pub(crate) fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 2 > MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Bson::Document(d) => cur = d.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

/// Set `path`, creating intermediate documents. Returns whether the stored value changed.
pub(crate) fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
    let (parent, last) = parent_for_write(root, path);
    let changed = parent.get(last).is_none_or(|old| old != &value);
    parent.insert(last.to_string(), value);
    changed
}

pub(crate) fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    let mut cur = root;
    let mut parts = path.split('.').peekable();
    while let Some(seg) = parts.next() {
        if parts.peek().is_none() {
            return cur.remove(seg).is_some();
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

fn parent_for_write<'a, 'p>(root: &'a mut BsonDocument, path: &'p str) -> (&'a mut BsonDocument, &'p str) {
    let (head, last) = match path.rsplit_once('.') {
        Some((h, l)) => (Some(h), l),
        None => (None, path),
    };
    let mut cur = root;
    if let Some(head) = head {
        for seg in head.split('.') {
            if !matches!(cur.get(seg), Some(Bson::Document(_))) {
                cur.insert(seg.to_string(), Bson::Document(BsonDocument::new()));
            }
            cur = match cur.get_mut(seg) {
                Some(Bson::Document(d)) => d,
                _ => unreachable!("subdocument inserted above"),
            };
        }
    }
    (cur, last)
}

#[must_use]
pub fn project_fields(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include { fields, include_id } => {
            let mut out = BsonDocument::new();
            if *include_id && let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD, id.clone());
            }
            for f in fields {
                if f == ID_FIELD {
                    continue;
                }
                if let Some(v) = get_path(doc, f) {
                    set_path(&mut out, f, v.clone());
                }
            }
            out
        }
        Projection::Exclude { fields } => {
            let mut out = doc.clone();
            for f in fields {
                unset_path(&mut out, f);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn array_field_matches_any_element() {
        let d = doc! { "tags": ["classic", "dystopia"] };
        assert!(eval_filter(&d, &Filter::eq("tags", "dystopia")));
        assert!(!eval_filter(&d, &Filter::eq("tags", "romance")));
    }

    #[test]
    fn ne_matches_missing_field() {
        let d = doc! { "title": "Emma" };
        assert!(eval_filter(&d, &Filter::cmp("genre", CmpOp::Ne, "Fiction")));
        assert!(!eval_filter(&d, &Filter::cmp("genre", CmpOp::Eq, "Fiction")));
    }

    #[test]
    fn range_across_type_brackets_never_matches() {
        let d = doc! { "published_year": "1999" };
        assert!(!eval_filter(&d, &Filter::cmp("published_year", CmpOp::Gt, 1000)));
        assert!(!eval_filter(&d, &Filter::cmp("published_year", CmpOp::Lt, 3000)));
    }

    #[test]
    fn numeric_equality_is_cross_type() {
        let d = doc! { "price": 12.0 };
        assert!(eval_filter(&d, &Filter::eq("price", 12)));
        assert!(eval_filter(&d, &Filter::eq("price", 12_i64)));
    }

    #[test]
    fn dotted_paths_and_nested_set() {
        let mut d = doc! { "meta": { "pages": 328 } };
        assert_eq!(get_path(&d, "meta.pages"), Some(&Bson::Int32(328)));
        assert!(set_path(&mut d, "meta.lang.code", "en".into()));
        assert_eq!(d.get_document("meta").unwrap().get_document("lang").unwrap().get_str("code").unwrap(), "en");
        assert!(!set_path(&mut d, "meta.pages", 328.into()));
        assert!(unset_path(&mut d, "meta.pages"));
        assert!(!unset_path(&mut d, "meta.pages"));
    }

    #[test]
    fn inclusion_projection_keeps_id_unless_suppressed() {
        let d = doc! { "_id": "x", "title": "1984", "author": "George Orwell", "price": 9.5 };
        let with_id = project_fields(&d, &Projection::include(["title"]));
        assert_eq!(with_id, doc! { "_id": "x", "title": "1984" });
        let without = project_fields(&d, &Projection::include_without_id(["title", "price"]));
        assert_eq!(without, doc! { "title": "1984", "price": 9.5 });
        let excl = project_fields(&d, &Projection::Exclude { fields: vec!["price".into()] });
        assert!(excl.get("price").is_none());
        assert!(excl.get("author").is_some());
    }

    #[test]
    fn missing_sorts_first_ascending() {
        let a = doc! { "price": 5 };
        let b = doc! {};
        let asc = [SortSpec::asc("price")];
        assert_eq!(compare_docs(&a, &b, &asc), Ordering::Greater);
        let desc = [SortSpec::desc("price")];
        assert_eq!(compare_docs(&a, &b, &desc), Ordering::Less);
    }
}
