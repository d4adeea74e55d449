//! JSON <-> BSON conversion with predictable numeric typing.
//!
//! Integers that fit in 32 bits become `Int32`, other integers `Int64`, and every
//! fractional number `Double`. Output keeps plain JSON numbers (no extended JSON).

use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};
use serde_json::{Map, Number, Value};

#[must_use]
pub fn json_to_bson(val: &Value) -> Bson {
    match val {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number_to_bson(n),
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(map_to_bson_document(map)),
    }
}

fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32);
    }
    // u64 beyond i64 range and all fractional values
    Bson::Double(n.as_f64().unwrap_or(f64::NAN))
}

#[must_use]
pub fn map_to_bson_document(map: &Map<String, Value>) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (k, v) in map {
        out.insert(k.clone(), json_to_bson(v));
    }
    out
}

/// Convert a JSON value that must be an object into a BSON document.
///
/// # Errors
/// Returns `DbError::InvalidDocument` when the value is not an object.
pub fn json_value_to_bson_document(val: &Value) -> Result<BsonDocument, DbError> {
    val.as_object()
        .map(map_to_bson_document)
        .ok_or_else(|| DbError::InvalidDocument("expected JSON object".into()))
}

/// Parse a JSON string into a BSON document. The JSON must be a top-level object.
///
/// # Errors
/// Returns an error on malformed JSON or a non-object top level.
pub fn parse_json_to_bson_document(json: &str) -> Result<BsonDocument, DbError> {
    let val: Value = serde_json::from_str(json)?;
    json_value_to_bson_document(&val)
}

#[must_use]
pub fn bson_to_json(val: &Bson) -> Value {
    match val {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(d) => bson_document_to_json(d),
        Bson::DateTime(dt) => Value::from(dt.timestamp_millis()),
        other => Value::String(other.to_string()),
    }
}

#[must_use]
pub fn bson_document_to_json(doc: &BsonDocument) -> Value {
    let mut out = Map::new();
    for (k, v) in doc {
        out.insert(k.clone(), bson_to_json(v));
    }
    Value::Object(out)
}
