use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::utils::json::json_value_to_bson_document;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use super::options::{ImportOptions, ImportReport};
use super::util::ErrorSidecar;

/// One JSON object per line; blank lines are ignored.
pub fn import_ndjson<R: Read>(
    collection: &Arc<Collection>,
    reader: R,
    opts: &ImportOptions,
    report: &mut ImportReport,
) -> Result<(), DbError> {
    let mut reader = BufReader::new(reader);
    let mut sidecar = ErrorSidecar::open(opts.error_sidecar.as_deref(), opts.skip_errors)?;
    let mut line_no: usize = 0;
    let mut buf = String::with_capacity(8 * 1024);
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }
        let inserted = serde_json::from_str::<serde_json::Value>(line)
            .map_err(DbError::from)
            .and_then(|v| json_value_to_bson_document(&v))
            .and_then(|d| collection.insert_document(Document::new(d)));
        match inserted {
            Ok(_) => {
                report.inserted += 1;
                if let Some(n) = opts.progress_every
                    && n > 0
                    && line_no % n == 0
                {
                    log::info!("imported {} records (ndjson)", report.inserted);
                }
            }
            Err(e) if opts.skip_errors => {
                sidecar.record("line", line_no, &e.to_string(), Some(line));
                report.skipped += 1;
            }
            Err(e) => return Err(DbError::InvalidDocument(format!("line {line_no}: {e}"))),
        }
    }
    Ok(())
}

/// A single JSON array of objects.
pub fn import_json_array<R: Read>(
    collection: &Arc<Collection>,
    reader: R,
    opts: &ImportOptions,
    report: &mut ImportReport,
) -> Result<(), DbError> {
    let val: serde_json::Value = serde_json::from_reader(BufReader::new(reader))?;
    let arr = val.as_array().ok_or_else(|| DbError::InvalidDocument("expected a JSON array".into()))?;
    let mut sidecar = ErrorSidecar::open(opts.error_sidecar.as_deref(), opts.skip_errors)?;
    for (i, v) in arr.iter().enumerate() {
        match json_value_to_bson_document(v).and_then(|d| collection.insert_document(Document::new(d))) {
            Ok(_) => report.inserted += 1,
            Err(e) if opts.skip_errors => {
                sidecar.record("index", i, &e.to_string(), None);
                report.skipped += 1;
            }
            Err(e) => return Err(DbError::InvalidDocument(format!("element {i}: {e}"))),
        }
    }
    Ok(())
}
