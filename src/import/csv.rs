use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use bson::Document as BsonDocument;
use std::io::Read;
use std::sync::Arc;

use super::options::{ImportOptions, ImportReport};
use super::util::{ErrorSidecar, field_to_bson};

/// Rows become documents keyed by header (or `field_{i}` without headers).
pub fn import_csv<R: Read>(
    collection: &Arc<Collection>,
    reader: R,
    opts: &ImportOptions,
    report: &mut ImportReport,
) -> Result<(), DbError> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(opts.csv.has_headers)
        .delimiter(opts.csv.delimiter)
        .from_reader(reader);
    let headers: Vec<String> = if opts.csv.has_headers {
        rdr.headers()?.iter().map(str::to_string).collect()
    } else {
        Vec::new()
    };
    let mut sidecar = ErrorSidecar::open(opts.error_sidecar.as_deref(), opts.skip_errors)?;
    for (i, rec) in rdr.records().enumerate() {
        let row_no = i + 1;
        let inserted = rec.map_err(DbError::from).and_then(|rec| {
            let mut map = BsonDocument::new();
            for (i, field) in rec.iter().enumerate() {
                let key = headers.get(i).cloned().unwrap_or_else(|| format!("field_{i}"));
                map.insert(key, field_to_bson(field, opts.csv.type_infer));
            }
            collection.insert_document(Document::new(map))
        });
        match inserted {
            Ok(_) => {
                report.inserted += 1;
                if let Some(n) = opts.progress_every
                    && n > 0
                    && row_no % n == 0
                {
                    log::info!("imported {} records (csv)", report.inserted);
                }
            }
            Err(e) if opts.skip_errors => {
                sidecar.record("row", row_no, &e.to_string(), None);
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
