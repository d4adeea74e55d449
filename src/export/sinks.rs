use bson::{Bson, Document as BsonDocument};
use std::io::{self, BufWriter, Write};

use crate::utils::json::{bson_document_to_json, bson_to_json};

pub trait DocSink {
    fn write_doc(&mut self, doc: &BsonDocument) -> io::Result<()>;
    fn finish(self: Box<Self>) -> io::Result<()>;
}

pub struct NdjsonSink<W: Write> {
    w: BufWriter<W>,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(inner: W) -> Self {
        Self { w: BufWriter::new(inner) }
    }
}

impl<W: Write> DocSink for NdjsonSink<W> {
    fn write_doc(&mut self, doc: &BsonDocument) -> io::Result<()> {
        let s = serde_json::to_string(&bson_document_to_json(doc)).map_err(io::Error::other)?;
        writeln!(self.w, "{s}")
    }
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.w.flush()
    }
}

/// Streams a pretty-free JSON array: `[` on open, commas between elements, `]` on finish.
pub struct JsonArraySink<W: Write> {
    w: BufWriter<W>,
    first: bool,
}

impl<W: Write> JsonArraySink<W> {
    pub fn new(inner: W) -> Self {
        Self { w: BufWriter::new(inner), first: true }
    }
}

impl<W: Write> DocSink for JsonArraySink<W> {
    fn write_doc(&mut self, doc: &BsonDocument) -> io::Result<()> {
        self.w.write_all(if self.first { b"[\n" } else { b",\n" })?;
        self.first = false;
        serde_json::to_writer(&mut self.w, &bson_document_to_json(doc)).map_err(io::Error::other)
    }
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.w.write_all(if self.first { b"[]\n" } else { b"\n]\n" })?;
        self.w.flush()
    }
}

/// Column set is fixed by the first document; later keys outside it are dropped.
pub struct CsvSink<W: Write> {
    w: csv::Writer<BufWriter<W>>,
    headers: Option<Vec<String>>,
    write_headers: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, delimiter: u8, write_headers: bool) -> Self {
        let w = csv::WriterBuilder::new().delimiter(delimiter).from_writer(BufWriter::new(inner));
        Self { w, headers: None, write_headers }
    }
}

impl<W: Write> DocSink for CsvSink<W> {
    fn write_doc(&mut self, doc: &BsonDocument) -> io::Result<()> {
        if self.headers.is_none() {
            let hdrs: Vec<String> = doc.keys().cloned().collect();
            if self.write_headers {
                self.w.write_record(&hdrs).map_err(io::Error::other)?;
            }
            self.headers = Some(hdrs);
        }
        let row: Vec<String> =
            self.headers.iter().flatten().map(|k| doc.get(k).map(cell).unwrap_or_default()).collect();
        self.w.write_record(&row).map_err(io::Error::other)
    }
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.w.flush()
    }
}

fn cell(v: &Bson) -> String {
    match v {
        Bson::Null => String::new(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        // Debug keeps the trailing ".0" so integral prices re-import as doubles.
        Bson::Double(f) => format!("{f:?}"),
        Bson::Boolean(b) => b.to_string(),
        other => bson_to_json(other).to_string(),
    }
}
