use crate::aggregate::{self, parse_pipeline_json};
use crate::collection::Collection;
use crate::errors::DbError;
use crate::explain::Verbosity;
use crate::export::{ExportOptions, export_file};
use crate::import::{ImportOptions, import_file};
use crate::index::parse_index_keys_json;
use crate::query::{self, DeleteReport, FindOptions, UpdateReport};
use crate::utils::json::bson_document_to_json;
use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::error::Error;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use super::command::Command;
use super::demo::run_demo;
use super::util::{parse_export_format, parse_import_format};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Human,
    Plain,
    Json,
}

impl FromStr for OutputMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(DbError::Config(format!("unknown output mode {other}"))),
        }
    }
}

/// Run against `collection`, printing human-readable output to stdout.
///
/// # Errors
/// Parse, query, and I/O errors.
pub fn run(collection: &Arc<Collection>, cmd: Command) -> Result<(), Box<dyn Error>> {
    let stdout = std::io::stdout();
    run_with_format(collection, cmd, OutputMode::Human, &mut stdout.lock())
}

/// # Errors
/// Parse, query, and I/O errors.
pub fn run_with_format(
    collection: &Arc<Collection>,
    cmd: Command,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Find { filter_json, projection_json, sort_json, skip, limit } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let mut opts = FindOptions { skip, limit, ..FindOptions::default() };
            if let Some(p) = projection_json {
                opts.projection = query::parse_projection_json(&p)?;
            }
            if let Some(s) = sort_json {
                let specs = query::parse_sort_json(&s)?;
                if !specs.is_empty() {
                    opts.sort = Some(specs);
                }
            }
            let docs = query::find_docs(collection, &filter, &opts).into_data();
            write_docs(out, mode, &docs)
        }
        Command::Count { filter_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let n = query::count_docs(collection, &filter);
            match mode {
                OutputMode::Json => writeln!(out, "{}", json!({ "count": n }))?,
                _ => writeln!(out, "{n}")?,
            }
            Ok(())
        }
        Command::UpdateOne { filter_json, update_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let update = query::parse_update_json(&update_json)?;
            write_update(out, mode, query::update_one(collection, &filter, &update)?)
        }
        Command::UpdateMany { filter_json, update_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let update = query::parse_update_json(&update_json)?;
            write_update(out, mode, query::update_many(collection, &filter, &update)?)
        }
        Command::DeleteOne { filter_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            write_delete(out, mode, query::delete_one(collection, &filter))
        }
        Command::DeleteMany { filter_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            write_delete(out, mode, query::delete_many(collection, &filter))
        }
        Command::Aggregate { pipeline_json } => {
            let pipeline = parse_pipeline_json(&pipeline_json)?;
            let rows = aggregate::aggregate(collection, &pipeline)?;
            write_docs(out, mode, &rows)
        }
        Command::CreateIndex { keys_json, name } => {
            let mut spec = parse_index_keys_json(&keys_json)?;
            if let Some(n) = name {
                spec = spec.with_name(n);
            }
            let name = collection.create_index(spec)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", json!({ "created": name }))?,
                _ => writeln!(out, "{name}")?,
            }
            Ok(())
        }
        Command::DropIndex { name } => {
            collection.drop_index(&name)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", json!({ "dropped": name }))?,
                OutputMode::Plain => writeln!(out, "{name}")?,
                OutputMode::Human => writeln!(out, "dropped {name}")?,
            }
            Ok(())
        }
        Command::ListIndexes => {
            let indexes = collection.list_indexes();
            match mode {
                OutputMode::Json => {
                    let arr: Vec<Value> =
                        indexes.iter().map(|d| json!({ "name": d.name, "key": d.spec.key_pattern() })).collect();
                    writeln!(out, "{}", Value::Array(arr))?;
                }
                _ => {
                    for d in indexes {
                        writeln!(out, "{}\t{}", d.name, d.spec.key_pattern())?;
                    }
                }
            }
            Ok(())
        }
        Command::Explain { filter_json, verbosity } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let verbosity = verbosity.as_deref().map(Verbosity::from_str).transpose()?.unwrap_or_default();
            let report = query::explain_find(collection, &filter, &FindOptions::default(), verbosity);
            match mode {
                OutputMode::Human => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
                _ => writeln!(out, "{}", report.to_json())?,
            }
            Ok(())
        }
        Command::Import { file, format, skip_errors } => {
            let opts = ImportOptions {
                format: parse_import_format(format.as_deref()),
                skip_errors,
                ..ImportOptions::default()
            };
            let r = import_file(collection, &file, &opts)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", json!({ "inserted": r.inserted, "skipped": r.skipped }))?,
                OutputMode::Plain => writeln!(out, "inserted={} skipped={}", r.inserted, r.skipped)?,
                OutputMode::Human => {
                    writeln!(out, "imported {} document(s) from {}, skipped {}", r.inserted, file.display(), r.skipped)?;
                }
            }
            Ok(())
        }
        Command::Export { file, format, filter_json, limit } => {
            let mut opts = ExportOptions { format: parse_export_format(format.as_deref(), &file), ..ExportOptions::default() };
            if let Some(fj) = filter_json {
                opts.filter = Some(query::parse_filter_json(&fj)?);
            }
            opts.limit = limit;
            let r = export_file(collection, &file, &opts)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", json!({ "written": r.written }))?,
                OutputMode::Plain => writeln!(out, "written={}", r.written)?,
                OutputMode::Human => writeln!(out, "exported {} document(s) to {}", r.written, file.display())?,
            }
            Ok(())
        }
        Command::Demo => run_demo(mode, out),
    }
}

fn write_docs(out: &mut dyn Write, mode: OutputMode, docs: &[BsonDocument]) -> Result<(), Box<dyn Error>> {
    match mode {
        OutputMode::Json => {
            let arr: Vec<Value> = docs.iter().map(bson_document_to_json).collect();
            writeln!(out, "{}", Value::Array(arr))?;
        }
        // NDJSON, one document per line
        _ => {
            for d in docs {
                writeln!(out, "{}", bson_document_to_json(d))?;
            }
        }
    }
    Ok(())
}

fn write_update(out: &mut dyn Write, mode: OutputMode, r: UpdateReport) -> Result<(), Box<dyn Error>> {
    match mode {
        OutputMode::Json => writeln!(out, "{}", json!({ "matched": r.matched, "modified": r.modified }))?,
        OutputMode::Plain => writeln!(out, "matched={} modified={}", r.matched, r.modified)?,
        OutputMode::Human => writeln!(out, "matched {} document(s), modified {}", r.matched, r.modified)?,
    }
    Ok(())
}

fn write_delete(out: &mut dyn Write, mode: OutputMode, r: DeleteReport) -> Result<(), Box<dyn Error>> {
    match mode {
        OutputMode::Json => writeln!(out, "{}", json!({ "deleted": r.deleted }))?,
        OutputMode::Plain => writeln!(out, "deleted={}", r.deleted)?,
        OutputMode::Human => writeln!(out, "deleted {} document(s)", r.deleted)?,
    }
    Ok(())
}
