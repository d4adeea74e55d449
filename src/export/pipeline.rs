use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::collection::Collection;
use crate::errors::DbError;
use crate::query;

use super::options::{ExportFormat, ExportOptions, ExportReport};
use super::sinks::{CsvSink, DocSink, JsonArraySink, NdjsonSink};

/// Export a collection to a file atomically via a temp file + persist.
///
/// # Errors
/// Returns an error if the destination cannot be created or the write/persist fails.
pub fn export_file(
    collection: &Arc<Collection>,
    path: impl AsRef<Path>,
    opts: &ExportOptions,
) -> Result<ExportReport, DbError> {
    let dest = path.as_ref();
    log::info!("export: collection={}, path={}", collection.name_str(), dest.display());
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.exists() {
        std::fs::create_dir_all(parent)?;
    }
    // Same directory as the destination so persist is a rename.
    let mut tmp = NamedTempFile::new_in(parent)?;
    let report = export_into_writer(collection, &mut tmp, opts)?;
    tmp.persist(dest).map_err(|e| DbError::from(e.error))?;
    Ok(report)
}

/// Export a collection into any writer.
///
/// # Errors
/// Returns an error when writing fails.
pub fn export_to_writer<W: Write>(
    collection: &Arc<Collection>,
    writer: W,
    opts: &ExportOptions,
) -> Result<ExportReport, DbError> {
    export_into_writer(collection, writer, opts)
}

fn export_into_writer<W: Write>(
    collection: &Arc<Collection>,
    writer: W,
    opts: &ExportOptions,
) -> Result<ExportReport, DbError> {
    let mut sink: Box<dyn DocSink + '_> = match opts.format {
        ExportFormat::Ndjson => Box::new(NdjsonSink::new(writer)),
        ExportFormat::Json => Box::new(JsonArraySink::new(writer)),
        ExportFormat::Csv => Box::new(CsvSink::new(writer, opts.csv.delimiter, opts.csv.write_headers)),
    };
    let mut report = ExportReport::default();
    let mut remaining = opts.limit.unwrap_or(usize::MAX);
    for doc in collection.get_all_documents() {
        if remaining == 0 {
            break;
        }
        if let Some(f) = &opts.filter
            && !query::eval_filter(&doc.data, f)
        {
            continue;
        }
        sink.write_doc(&doc.data)?;
        report.written += 1;
        remaining -= 1;
    }
    sink.finish()?;
    log::info!("export from {} done: written={}", collection.name_str(), report.written);
    Ok(report)
}
