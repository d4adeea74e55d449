use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::collection::Collection;
use crate::errors::DbError;

use super::csv::import_csv;
use super::detect::detect_format;
use super::ndjson::{import_json_array, import_ndjson};
use super::options::{ImportFormat, ImportOptions, ImportReport};

/// Import data from a file path into the collection.
///
/// # Errors
/// I/O failures, malformed input (unless `skip_errors`), or `Auto` left unresolved.
pub fn import_file<P: AsRef<Path>>(
    collection: &Arc<Collection>,
    path: P,
    opts: &ImportOptions,
) -> Result<ImportReport, DbError> {
    log::info!("import: path={}, collection={}", path.as_ref().display(), collection.name_str());
    let mut reader = BufReader::new(File::open(&path)?);
    let format = match opts.format {
        ImportFormat::Auto => detect_format(&mut reader, path.as_ref())?,
        other => other,
    };
    import_from_reader(collection, reader, format, opts)
}

/// Import data from an arbitrary reader in a known format.
///
/// # Errors
/// See [`import_file`].
pub fn import_from_reader<R: Read>(
    collection: &Arc<Collection>,
    reader: R,
    format: ImportFormat,
    opts: &ImportOptions,
) -> Result<ImportReport, DbError> {
    let mut report = ImportReport::default();
    match format {
        ImportFormat::Ndjson => import_ndjson(collection, reader, opts, &mut report)?,
        ImportFormat::Json => import_json_array(collection, reader, opts, &mut report)?,
        ImportFormat::Csv => import_csv(collection, reader, opts, &mut report)?,
        ImportFormat::Auto => {
            return Err(DbError::InvalidDocument("import format must be resolved before reading".into()));
        }
    }
    log::info!(
        "import into {} done: inserted={} skipped={}",
        collection.name_str(),
        report.inserted,
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Arc<Collection> {
        Arc::new(Collection::new(name))
    }

    #[test]
    fn ndjson_skips_errors_when_enabled() {
        let c = col("u_imp");
        let data = b"{\"a\":1}\n{bad}\n\n{\"a\":2}\n";
        let opts = ImportOptions { skip_errors: true, ..ImportOptions::default() };
        let report = import_from_reader(&c, &data[..], ImportFormat::Ndjson, &opts).unwrap();
        assert_eq!(report, ImportReport { inserted: 2, skipped: 1 });
    }

    #[test]
    fn ndjson_errors_when_skip_disabled() {
        let c = col("u_imp");
        let data = b"{\"a\":1}\n{bad}\n{\"a\":2}\n";
        assert!(import_from_reader(&c, &data[..], ImportFormat::Ndjson, &ImportOptions::default()).is_err());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn json_array_rejects_non_objects() {
        let c = col("u_arr");
        let opts = ImportOptions { skip_errors: true, ..ImportOptions::default() };
        let report = import_from_reader(&c, &b"[{\"a\":1}, 3, {\"a\":2}]"[..], ImportFormat::Json, &opts).unwrap();
        assert_eq!(report, ImportReport { inserted: 2, skipped: 1 });
    }

    #[test]
    fn csv_with_headers_infers_types() {
        let c = col("u_csv");
        let data = b"title,published_year,price,in_stock\n1984,1949,9.99,true\n";
        let report = import_from_reader(&c, &data[..], ImportFormat::Csv, &ImportOptions::default()).unwrap();
        assert_eq!(report.inserted, 1);
        let d = &c.get_all_documents()[0].data;
        assert_eq!(d.get_str("title").unwrap(), "1984");
        assert_eq!(d.get_i32("published_year").unwrap(), 1949);
        assert!(d.get_bool("in_stock").unwrap());
    }

    #[test]
    fn csv_without_headers_and_no_infer() {
        let c = col("u_csv2");
        let mut opts = ImportOptions::default();
        opts.csv.has_headers = false;
        opts.csv.type_infer = false;
        opts.csv.delimiter = b';';
        import_from_reader(&c, &b"1;2\n3;4\n"[..], ImportFormat::Csv, &opts).unwrap();
        let firsts: Vec<String> =
            c.get_all_documents().iter().map(|d| d.data.get_str("field_0").unwrap().to_string()).collect();
        assert_eq!(firsts, vec!["1", "3"]);
    }

    #[test]
    fn csv_sidecar_on_error_when_skipping() {
        let c = col("u_csv3");
        let dir = tempfile::tempdir().unwrap();
        let sidecar_path = dir.path().join("errors.jsonl");
        let opts = ImportOptions {
            skip_errors: true,
            error_sidecar: Some(sidecar_path.clone()),
            ..ImportOptions::default()
        };
        let data = b"a,b\n1,2\n3,4,5\n6,7\n";
        let report = import_from_reader(&c, &data[..], ImportFormat::Csv, &opts).unwrap();
        assert_eq!(report.skipped, 1);
        let side = std::fs::read_to_string(sidecar_path).unwrap();
        assert!(side.contains("\"row\":2"));
    }

    #[test]
    fn import_file_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        std::fs::write(&path, "[{\"title\":\"Emma\"},{\"title\":\"Dune\"}]").unwrap();
        let c = col("u_file");
        assert_eq!(import_file(&c, &path, &ImportOptions::default()).unwrap().inserted, 2);
    }
}
