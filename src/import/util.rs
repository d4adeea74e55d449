use bson::Bson;
use serde_json::Value;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// CSV cell to BSON. With inference, integers become `Int32` (or `Int64` when too large),
/// decimals `Double`, `true`/`false` booleans and empty cells null.
pub fn field_to_bson(field: &str, infer: bool) -> Bson {
    if !infer {
        return Bson::String(field.to_string());
    }
    if field.is_empty() {
        return Bson::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32);
    }
    if let Ok(f) = field.parse::<f64>()
        && f.is_finite()
    {
        return Bson::Double(f);
    }
    match field.to_lowercase().as_str() {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(field.to_string()),
    }
}

/// Writer for rejected records; a no-op unless a sidecar path is configured.
pub struct ErrorSidecar(Option<File>);

impl ErrorSidecar {
    pub fn open(path: Option<&Path>, skip_errors: bool) -> io::Result<Self> {
        match path {
            Some(p) if skip_errors => Ok(Self(Some(File::create(p)?))),
            _ => Ok(Self(None)),
        }
    }

    pub fn record(&mut self, position: &str, index: usize, error: &str, record: Option<&str>) {
        if let Some(f) = self.0.as_mut() {
            let mut line = serde_json::Map::new();
            line.insert(position.to_string(), Value::from(index));
            line.insert("error".into(), Value::from(error));
            if let Some(r) = record {
                line.insert("record".into(), Value::from(r));
            }
            if let Err(e) = writeln!(f, "{}", Value::Object(line)) {
                log::warn!("import: cannot write error sidecar: {e}");
            }
        }
    }
}
