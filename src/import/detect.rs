//! Format detection heuristics for import.

use std::io::{self, BufRead};
use std::path::Path;

use super::ImportFormat;

/// Pick a format from the extension, falling back to the first bytes of content.
/// `.json` files holding an array are read as `Json`, otherwise as NDJSON.
///
/// # Errors
/// Returns an error if peeking at the reader fails.
pub fn detect_format<R: BufRead>(reader: &mut R, path: &Path) -> io::Result<ImportFormat> {
    let by_ext = path.extension().and_then(|s| s.to_str()).map(str::to_lowercase);
    match by_ext.as_deref() {
        Some("jsonl" | "ndjson") => return Ok(ImportFormat::Ndjson),
        Some("csv" | "tsv") => return Ok(ImportFormat::Csv),
        _ => {}
    }
    let buf = reader.fill_buf()?; // peek without consuming
    let head = String::from_utf8_lossy(&buf[..buf.len().min(256)]);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with('[') {
        return Ok(ImportFormat::Json);
    }
    if head.starts_with('{') || by_ext.as_deref() == Some("json") {
        return Ok(ImportFormat::Ndjson);
    }
    Ok(ImportFormat::Csv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn detect(data: &[u8], name: &str) -> ImportFormat {
        detect_format(&mut BufReader::new(data), Path::new(name)).unwrap()
    }

    #[test]
    fn by_extension() {
        assert_eq!(detect(b"{\"k\":1}\n", "x.jsonl"), ImportFormat::Ndjson);
        assert_eq!(detect(b"{\"k\":1}\n", "x.csv"), ImportFormat::Csv);
        assert_eq!(detect(b"[{\"k\":1}]", "x.json"), ImportFormat::Json);
        assert_eq!(detect(b"{\"k\":1}\n", "x.json"), ImportFormat::Ndjson);
    }

    #[test]
    fn by_content() {
        assert_eq!(detect(b"  [\n{\"x\":1}]", "data.txt"), ImportFormat::Json);
        assert_eq!(detect(b"{\"x\":1}\n", "data.txt"), ImportFormat::Ndjson);
        assert_eq!(detect(b"a,b\n1,2\n", "data.txt"), ImportFormat::Csv);
    }
}
