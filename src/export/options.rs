use crate::query::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Ndjson,
    Json,
    Csv,
}

impl ExportFormat {
    /// Guess from a file extension; anything unknown is NDJSON.
    #[must_use]
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext.map(str::to_lowercase).as_deref() {
            Some("csv") => Self::Csv,
            Some("json") => Self::Json,
            _ => Self::Ndjson,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub write_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',', write_headers: true }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub csv: CsvOptions,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { format: ExportFormat::Ndjson, csv: CsvOptions::default(), filter: None, limit: None }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub written: u64,
}
