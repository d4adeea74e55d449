use crate::export::ExportFormat;
use crate::import::ImportFormat;
use std::path::Path;

fn parse_format_input(s: Option<&str>) -> Option<String> {
    s.map(str::to_lowercase)
}

pub fn parse_import_format(s: Option<&str>) -> ImportFormat {
    match parse_format_input(s).as_deref() {
        Some("csv") => ImportFormat::Csv,
        Some("json" | "array") => ImportFormat::Json,
        Some("ndjson" | "jsonl") => ImportFormat::Ndjson,
        _ => ImportFormat::Auto,
    }
}

/// An explicit format wins; otherwise the destination's extension decides.
pub fn parse_export_format(s: Option<&str>, dest: &Path) -> ExportFormat {
    match parse_format_input(s).as_deref() {
        Some("csv") => ExportFormat::Csv,
        Some("json" | "array") => ExportFormat::Json,
        Some("ndjson" | "jsonl") => ExportFormat::Ndjson,
        _ => ExportFormat::from_extension(dest.extension().and_then(|e| e.to_str())),
    }
}
