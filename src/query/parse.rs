use crate::document::ID_FIELD;
use crate::errors::DbError;
use crate::utils::json::{bson_to_json, json_to_bson};
use bson::Bson;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::{
    CmpOp, Filter, MAX_IN_SET, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, MAX_UPDATE_FIELDS, Order, Projection, SortSpec,
    UpdateDoc,
};

/// # Errors
/// Returns an error if the JSON string is not a valid filter document.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    let v: Value = serde_json::from_str(json)?;
    parse_filter_value(&v)
}

/// Parse a Mongo-style filter: top-level fields are implicitly ANDed.
///
/// # Errors
/// Returns `DbError::QueryError` on unknown operators or malformed operands.
pub fn parse_filter_value(v: &Value) -> Result<Filter, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("filter must be a JSON object"))?;
    let mut parts = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        match key.as_str() {
            "$and" => parts.push(Filter::And(parse_filter_list(key, val)?)),
            "$or" => parts.push(Filter::Or(parse_filter_list(key, val)?)),
            "$nor" => parts.push(Filter::Nor(parse_filter_list(key, val)?)),
            k if k.starts_with('$') => {
                return Err(DbError::query(format!("unknown top-level operator {k}")));
            }
            field => parts.push(parse_field_predicate(field, val)?),
        }
    }
    Ok(collapse_and(parts))
}

fn collapse_and(mut parts: Vec<Filter>) -> Filter {
    match parts.len() {
        0 => Filter::True,
        1 => parts.remove(0),
        _ => Filter::And(parts),
    }
}

fn parse_filter_list(op: &str, v: &Value) -> Result<Vec<Filter>, DbError> {
    let arr = v.as_array().ok_or_else(|| DbError::query(format!("{op} expects an array")))?;
    if arr.is_empty() {
        return Err(DbError::query(format!("{op} expects a non-empty array")));
    }
    arr.iter().map(parse_filter_value).collect()
}

fn is_operator_doc(v: &Value) -> Option<&Map<String, Value>> {
    v.as_object().filter(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn parse_field_predicate(field: &str, v: &Value) -> Result<Filter, DbError> {
    match is_operator_doc(v) {
        Some(ops) => parse_operator_doc(field, ops),
        None => Ok(Filter::Cmp { path: field.to_string(), op: CmpOp::Eq, value: json_to_bson(v) }),
    }
}

fn parse_operator_doc(field: &str, ops: &Map<String, Value>) -> Result<Filter, DbError> {
    let path = field.to_string();
    let mut parts = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let f = match op.as_str() {
            "$eq" => cmp(&path, CmpOp::Eq, operand),
            "$ne" => cmp(&path, CmpOp::Ne, operand),
            "$gt" => cmp(&path, CmpOp::Gt, operand),
            "$gte" => cmp(&path, CmpOp::Gte, operand),
            "$lt" => cmp(&path, CmpOp::Lt, operand),
            "$lte" => cmp(&path, CmpOp::Lte, operand),
            "$in" => Filter::In { path: path.clone(), values: parse_value_set(op, operand)? },
            "$nin" => Filter::Nin { path: path.clone(), values: parse_value_set(op, operand)? },
            "$exists" => Filter::Exists { path: path.clone(), exists: truthy(operand) },
            "$not" => {
                let inner = is_operator_doc(operand)
                    .ok_or_else(|| DbError::query("$not expects an operator document"))?;
                Filter::Not(Box::new(parse_operator_doc(field, inner)?))
            }
            #[cfg(feature = "regex")]
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| DbError::query("$regex expects a string"))?
                    .to_string();
                let case_insensitive =
                    ops.get("$options").and_then(Value::as_str).is_some_and(|o| o.contains('i'));
                Filter::Regex { path: path.clone(), pattern, case_insensitive }
            }
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => return Err(DbError::query(format!("unknown operator {other} on {field}"))),
        };
        parts.push(f);
    }
    Ok(collapse_and(parts))
}

fn cmp(path: &str, op: CmpOp, operand: &Value) -> Filter {
    Filter::Cmp { path: path.to_string(), op, value: json_to_bson(operand) }
}

fn parse_value_set(op: &str, v: &Value) -> Result<Vec<Bson>, DbError> {
    let arr = v.as_array().ok_or_else(|| DbError::query(format!("{op} expects an array")))?;
    if arr.len() > MAX_IN_SET {
        return Err(DbError::query(format!("{op} supports at most {MAX_IN_SET} values")));
    }
    Ok(arr.iter().map(json_to_bson).collect())
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum UnsetSerde {
    Keys(Vec<String>),
    Map(Map<String, Value>),
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateDocSerde {
    #[serde(default, rename = "$set")]
    set: Option<Map<String, Value>>,
    #[serde(default, rename = "$inc")]
    inc: Option<Map<String, Value>>,
    #[serde(default, rename = "$mul")]
    mul: Option<Map<String, Value>>,
    #[serde(default, rename = "$unset")]
    unset: Option<UnsetSerde>,
}

impl TryFrom<UpdateDocSerde> for UpdateDoc {
    type Error = DbError;
    fn try_from(us: UpdateDocSerde) -> Result<Self, Self::Error> {
        let mut out = Self::default();
        if let Some(setd) = us.set {
            check_update_width("$set", setd.len())?;
            for (k, v) in setd {
                out.set.push((k, json_to_bson(&v)));
            }
        }
        if let Some(incd) = us.inc {
            out.inc = numeric_pairs("$inc", incd)?;
        }
        if let Some(muld) = us.mul {
            out.mul = numeric_pairs("$mul", muld)?;
        }
        match us.unset {
            Some(UnsetSerde::Keys(keys)) => {
                check_update_width("$unset", keys.len())?;
                out.unset = keys;
            }
            Some(UnsetSerde::Map(m)) => {
                check_update_width("$unset", m.len())?;
                out.unset = m.into_iter().map(|(k, _)| k).collect();
            }
            None => {}
        }
        validate_update(&out)?;
        Ok(out)
    }
}

fn check_update_width(op: &str, n: usize) -> Result<(), DbError> {
    if n > MAX_UPDATE_FIELDS {
        return Err(DbError::query(format!("{op} supports at most {MAX_UPDATE_FIELDS} fields")));
    }
    Ok(())
}

fn numeric_pairs(op: &str, m: Map<String, Value>) -> Result<Vec<(String, Bson)>, DbError> {
    check_update_width(op, m.len())?;
    let mut out = Vec::with_capacity(m.len());
    for (k, v) in m {
        if !v.is_number() {
            return Err(DbError::query(format!("{op} requires numeric values ({k})")));
        }
        out.push((k, json_to_bson(&v)));
    }
    Ok(out)
}

/// Reject updates that would be no-ops by construction or touch the id.
///
/// # Errors
/// Returns `DbError::QueryError` for an empty update, an `_id` path, or a path named
/// by two operators.
pub fn validate_update(u: &UpdateDoc) -> Result<(), DbError> {
    if u.is_empty() {
        return Err(DbError::query("update document requires at least one operator"));
    }
    let mut seen = std::collections::HashSet::new();
    for p in u.paths() {
        if p == ID_FIELD || p.starts_with("_id.") {
            return Err(DbError::query("the _id field cannot be updated"));
        }
        if !seen.insert(p) {
            return Err(DbError::query(format!("conflicting update operators on {p}")));
        }
    }
    Ok(())
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into an update structure.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, DbError> {
    let us: UpdateDocSerde = serde_json::from_str(json)
        .map_err(|e| DbError::query(format!("invalid update document: {e}")))?;
    UpdateDoc::try_from(us)
}

/// # Errors
/// See [`parse_update_json`].
pub fn parse_update_value(v: &Value) -> Result<UpdateDoc, DbError> {
    let us = UpdateDocSerde::deserialize(v)
        .map_err(|e| DbError::query(format!("invalid update document: {e}")))?;
    UpdateDoc::try_from(us)
}

/// Parse a projection such as `{"title": 1, "author": 1, "_id": 0}`. `{}` means no projection.
///
/// # Errors
/// Returns `DbError::QueryError` when inclusion and exclusion are mixed.
pub fn parse_projection_json(json: &str) -> Result<Option<Projection>, DbError> {
    let v: Value = serde_json::from_str(json)?;
    parse_projection_value(&v)
}

/// # Errors
/// See [`parse_projection_json`].
pub fn parse_projection_value(v: &Value) -> Result<Option<Projection>, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("projection must be a JSON object"))?;
    if obj.len() > MAX_PROJECTION_FIELDS {
        return Err(DbError::query(format!("projection supports at most {MAX_PROJECTION_FIELDS} fields")));
    }
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut include_id = true;
    for (k, val) in obj {
        let on = match val {
            Value::Bool(_) | Value::Number(_) => truthy(val),
            _ => return Err(DbError::query(format!("projection value for {k} must be 0/1"))),
        };
        if k == ID_FIELD {
            include_id = on;
        } else if on {
            include.push(k.clone());
        } else {
            exclude.push(k.clone());
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (false, false) => Err(DbError::query("cannot mix inclusion and exclusion in a projection")),
        (false, true) => Ok(Some(Projection::Include { fields: include, include_id })),
        (true, false) => {
            if !include_id {
                exclude.push(ID_FIELD.to_string());
            }
            Ok(Some(Projection::Exclude { fields: exclude }))
        }
        (true, true) if !include_id => {
            Ok(Some(Projection::Exclude { fields: vec![ID_FIELD.to_string()] }))
        }
        (true, true) => Ok(None),
    }
}

/// Parse a sort document such as `{"price": -1}`; key order is significant.
///
/// # Errors
/// Returns `DbError::QueryError` for directions other than 1 / -1.
pub fn parse_sort_json(json: &str) -> Result<Vec<SortSpec>, DbError> {
    let v: Value = serde_json::from_str(json)?;
    parse_sort_value(&v)
}

/// # Errors
/// See [`parse_sort_json`].
pub fn parse_sort_value(v: &Value) -> Result<Vec<SortSpec>, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("sort must be a JSON object"))?;
    if obj.len() > MAX_SORT_FIELDS {
        return Err(DbError::query(format!("sort supports at most {MAX_SORT_FIELDS} fields")));
    }
    obj.iter()
        .map(|(k, d)| {
            let order = d
                .as_i64()
                .and_then(Order::from_direction)
                .ok_or_else(|| DbError::query(format!("sort direction for {k} must be 1 or -1")))?;
            Ok(SortSpec { field: k.clone(), order })
        })
        .collect()
}

/// Render a filter back into Mongo JSON syntax (used by explain and query logs).
///
/// The output parses back into an equivalent filter. A negated single-field predicate
/// renders as `{path: {"$not": {...}}}`; any other negation renders as `{"$nor": [...]}`.
#[must_use]
pub fn filter_to_value(f: &Filter) -> Value {
    fn list(name: &str, fs: &[Filter]) -> Value {
        let mut m = Map::new();
        m.insert(name.to_string(), Value::Array(fs.iter().map(filter_to_value).collect()));
        Value::Object(m)
    }
    match f {
        Filter::True => Value::Object(Map::new()),
        Filter::And(fs) => list("$and", fs),
        Filter::Or(fs) => list("$or", fs),
        Filter::Nor(fs) => list("$nor", fs),
        other => match field_ops(other) {
            Some((path, ops)) => {
                let mut outer = Map::new();
                outer.insert(path.to_string(), Value::Object(ops));
                Value::Object(outer)
            }
            None => list("$nor", std::slice::from_ref(unwrap_not(other))),
        },
    }
}

fn unwrap_not(f: &Filter) -> &Filter {
    match f {
        Filter::Not(inner) => inner,
        other => other,
    }
}

/// The operator document of a predicate that constrains a single path, if it is one.
fn field_ops(f: &Filter) -> Option<(&str, Map<String, Value>)> {
    fn single<'a>(path: &'a str, name: &str, v: Value) -> Option<(&'a str, Map<String, Value>)> {
        let mut m = Map::new();
        m.insert(name.to_string(), v);
        Some((path, m))
    }
    let set = |vs: &[Bson]| Value::Array(vs.iter().map(bson_to_json).collect());
    match f {
        Filter::Exists { path, exists } => single(path, "$exists", Value::Bool(*exists)),
        Filter::In { path, values } => single(path, "$in", set(values)),
        Filter::Nin { path, values } => single(path, "$nin", set(values)),
        Filter::Cmp { path, op, value } => single(path, op.as_str(), bson_to_json(value)),
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            let mut m = Map::new();
            m.insert("$regex".into(), Value::from(pattern.clone()));
            if *case_insensitive {
                m.insert("$options".into(), Value::from("i"));
            }
            Some((path, m))
        }
        Filter::Not(inner) => {
            let (path, ops) = field_ops(inner)?;
            single(path, "$not", Value::Object(ops))
        }
        Filter::And(fs) => {
            let mut merged: Option<(&str, Map<String, Value>)> = None;
            for part in fs {
                let (path, ops) = field_ops(part)?;
                match merged.as_mut() {
                    None => merged = Some((path, ops)),
                    Some((p, acc)) => {
                        if *p != path || ops.keys().any(|k| acc.contains_key(k)) {
                            return None;
                        }
                        acc.extend(ops);
                    }
                }
            }
            merged
        }
        Filter::True | Filter::Or(_) | Filter::Nor(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_and_of_field_predicates() {
        let f = parse_filter_json(r#"{"in_stock": true, "published_year": {"$gt": 2010}}"#).unwrap();
        assert_eq!(
            f,
            Filter::And(vec![
                Filter::eq("in_stock", true),
                Filter::cmp("published_year", CmpOp::Gt, 2010),
            ])
        );
    }

    #[test]
    fn empty_filter_matches_all() {
        assert_eq!(parse_filter_json("{}").unwrap(), Filter::True);
    }

    #[test]
    fn literal_subdocument_is_equality() {
        let f = parse_filter_json(r#"{"meta": {"pages": 10}}"#).unwrap();
        assert!(matches!(f, Filter::Cmp { op: CmpOp::Eq, value: Bson::Document(_), .. }));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(parse_filter_json(r#"{"price": {"$near": 3}}"#).is_err());
        assert!(parse_filter_json(r#"{"$where": "x"}"#).is_err());
        assert!(parse_filter_json(r#"{"$or": []}"#).is_err());
    }

    #[test]
    fn set_update_parses() {
        let u = parse_update_json(r#"{"$set": {"price": 12.99}}"#).unwrap();
        assert_eq!(u.set, vec![("price".to_string(), Bson::Double(12.99))]);
    }

    #[test]
    fn update_without_operators_or_touching_id_is_rejected() {
        assert!(parse_update_json(r#"{"price": 1}"#).is_err());
        assert!(parse_update_json(r#"{}"#).is_err());
        assert!(parse_update_json(r#"{"$set": {"_id": "x"}}"#).is_err());
        assert!(parse_update_json(r#"{"$inc": {"price": "a"}}"#).is_err());
    }

    #[test]
    fn unset_accepts_map_or_list() {
        let a = parse_update_json(r#"{"$unset": {"price": ""}}"#).unwrap();
        let b = parse_update_json(r#"{"$unset": ["price"]}"#).unwrap();
        assert_eq!(a.unset, b.unset);
    }

    #[test]
    fn projection_forms() {
        let p = parse_projection_json(r#"{"title": 1, "author": 1, "price": 1, "_id": 0}"#).unwrap();
        assert_eq!(p, Some(Projection::include_without_id(["title", "author", "price"])));
        let e = parse_projection_json(r#"{"price": 0}"#).unwrap();
        assert_eq!(e, Some(Projection::Exclude { fields: vec!["price".into()] }));
        assert_eq!(parse_projection_json("{}").unwrap(), None);
        assert!(parse_projection_json(r#"{"title": 1, "price": 0}"#).is_err());
    }

    #[test]
    fn sort_preserves_key_order() {
        let s = parse_sort_json(r#"{"price": -1, "author": 1}"#).unwrap();
        assert_eq!(s, vec![SortSpec::desc("price"), SortSpec::asc("author")]);
        assert!(parse_sort_json(r#"{"price": 2}"#).is_err());
    }

    #[test]
    fn oversized_operands_are_rejected() {
        let values: Vec<usize> = (0..=MAX_IN_SET).collect();
        let err = parse_filter_value(&serde_json::json!({ "x": { "$in": values } })).unwrap_err();
        assert!(matches!(err, DbError::QueryError(_)));
        assert!(parse_filter_value(&serde_json::json!({ "x": { "$nin": values } })).is_err());
        let fits: Vec<usize> = (0..MAX_IN_SET).collect();
        assert!(parse_filter_value(&serde_json::json!({ "x": { "$in": fits } })).is_ok());

        let wide = |n: usize, v: Value| -> Value {
            Value::Object((0..n).map(|i| (format!("f{i}"), v.clone())).collect())
        };
        let over = MAX_UPDATE_FIELDS + 1;
        assert!(parse_update_value(&serde_json::json!({ "$set": wide(over, Value::from("v")) })).is_err());
        assert!(parse_update_value(&serde_json::json!({ "$inc": wide(over, Value::from(1)) })).is_err());
        assert!(parse_update_value(&serde_json::json!({ "$mul": wide(over, Value::from(2)) })).is_err());
        assert!(parse_update_value(&serde_json::json!({ "$unset": wide(over, Value::from("")) })).is_err());
        assert!(parse_update_value(&serde_json::json!({ "$set": wide(MAX_UPDATE_FIELDS, Value::from("v")) })).is_ok());

        assert!(parse_projection_value(&wide(MAX_PROJECTION_FIELDS + 1, Value::from(1))).is_err());
        assert!(parse_projection_value(&wide(MAX_PROJECTION_FIELDS, Value::from(1))).is_ok());
    }

    #[test]
    fn rendered_filters_parse_back() {
        let filters = [
            Filter::cmp("price", CmpOp::Gt, 10).negate(),
            Filter::And(vec![Filter::cmp("price", CmpOp::Gte, 5), Filter::cmp("price", CmpOp::Lt, 9)]).negate(),
            Filter::eq("title", "1984").negate().negate(),
            Filter::Or(vec![Filter::eq("genre", "Romance"), Filter::eq("in_stock", false)]).negate(),
            Filter::And(vec![Filter::eq("genre", "Romance"), Filter::eq("in_stock", false)]).negate(),
            Filter::In { path: "author".into(), values: vec![Bson::from("Jane Austen")] }.negate(),
        ];
        for f in filters {
            let rendered = filter_to_value(&f);
            let back = parse_filter_value(&rendered).unwrap();
            assert_eq!(filter_to_value(&back), rendered, "{rendered}");
        }
        assert_eq!(
            filter_to_value(&Filter::cmp("price", CmpOp::Gt, 10).negate()),
            serde_json::json!({ "price": { "$not": { "$gt": 10 } } })
        );
        assert_eq!(
            filter_to_value(&Filter::Or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]).negate()),
            serde_json::json!({ "$nor": [{ "$or": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] }] })
        );
    }
}
