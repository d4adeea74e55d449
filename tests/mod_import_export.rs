use shelfdb::book::Book;
use shelfdb::books::sample_books;
use shelfdb::collection::Collection;
use shelfdb::document::Document;
use shelfdb::export::{ExportFormat, ExportOptions, export_file, export_to_writer};
use shelfdb::import::{ImportFormat, ImportOptions, import_file, import_from_reader};
use shelfdb::query::parse_filter_json;
use std::io::Cursor;
use std::sync::Arc;

fn shelf() -> Arc<Collection> {
    let col = Arc::new(Collection::new("books"));
    for b in sample_books() {
        col.insert_document(Document::new(b.to_document())).unwrap();
    }
    col
}

fn books_of(col: &Collection) -> Vec<Book> {
    col.get_all_documents().iter().map(|d| Book::from_document(&d.data).unwrap()).collect()
}

fn ids_of(col: &Collection) -> Vec<String> {
    col.list_ids().iter().map(ToString::to_string).collect()
}

#[test]
fn json_formats_round_trip_through_a_file() {
    let src = shelf();
    let dir = tempfile::tempdir().unwrap();
    for (name, format) in [("books.ndjson", ExportFormat::Ndjson), ("books.json", ExportFormat::Json)] {
        let path = dir.path().join(name);
        let report = export_file(&src, &path, &ExportOptions { format, ..ExportOptions::default() }).unwrap();
        assert_eq!(report.written, 12, "{name}");

        let dst = Arc::new(Collection::new("copy"));
        let imported = import_file(&dst, &path, &ImportOptions::default()).unwrap();
        assert_eq!((imported.inserted, imported.skipped), (12, 0), "{name}");
        assert_eq!(books_of(&dst), books_of(&src), "{name}");
        assert_eq!(ids_of(&dst), ids_of(&src), "{name}");
    }
}

#[test]
fn csv_round_trip_infers_cell_types() {
    let src = shelf();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("books.csv");
    let opts = ExportOptions { format: ExportFormat::Csv, ..ExportOptions::default() };
    assert_eq!(export_file(&src, &path, &opts).unwrap().written, 12);

    let dst = Arc::new(Collection::new("copy"));
    assert_eq!(import_file(&dst, &path, &ImportOptions::default()).unwrap().inserted, 12);
    assert_eq!(ids_of(&dst), ids_of(&src));
    let docs = dst.get_all_documents();
    // a numeric-looking title comes back as a number
    assert_eq!(docs[0].data.get_i32("title").unwrap(), 1984);
    let rest: Vec<Book> = docs[1..].iter().map(|d| Book::from_document(&d.data).unwrap()).collect();
    assert_eq!(rest, books_of(&src)[1..].to_vec());
}

#[test]
fn filtered_export_to_a_writer() {
    let src = shelf();
    let opts = ExportOptions {
        format: ExportFormat::Ndjson,
        filter: Some(parse_filter_json(r#"{"genre":"Science Fiction"}"#).unwrap()),
        limit: Some(2),
        ..ExportOptions::default()
    };
    let mut buf = Vec::new();
    assert_eq!(export_to_writer(&src, &mut buf, &opts).unwrap().written, 2);
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(r#""title":"Neuromancer""#));
    assert!(lines[1].contains(r#""title":"The Martian""#));
}

#[test]
fn reimporting_the_same_ids_is_rejected_or_skipped() {
    let src = shelf();
    let mut buf = Vec::new();
    export_to_writer(&src, &mut buf, &ExportOptions::default()).unwrap();

    let strict = import_from_reader(&src, Cursor::new(buf.clone()), ImportFormat::Ndjson, &ImportOptions::default());
    assert!(strict.is_err());

    let lenient = ImportOptions { skip_errors: true, ..ImportOptions::default() };
    let report = import_from_reader(&src, Cursor::new(buf), ImportFormat::Ndjson, &lenient).unwrap();
    assert_eq!((report.inserted, report.skipped), (0, 12));
    assert_eq!(src.len(), 12);
}

#[test]
fn csv_without_ids_gets_fresh_ones() {
    let col = Arc::new(Collection::new("books"));
    let csv = "title,author,genre,published_year,price,in_stock\n\
               Dune,Frank Herbert,Science Fiction,1965,10.5,true\n\
               Emma,Jane Austen,Romance,1815,8,false\n";
    let report =
        import_from_reader(&col, Cursor::new(csv.as_bytes()), ImportFormat::Csv, &ImportOptions::default()).unwrap();
    assert_eq!(report.inserted, 2);
    let books = books_of(&col);
    assert_eq!(books[0], Book::new("Dune", "Frank Herbert", "Science Fiction", 1965, 10.5, true));
    assert_eq!(books[1], Book::new("Emma", "Jane Austen", "Romance", 1815, 8.0, false));
    assert_eq!(col.list_ids().len(), 2);
}

#[test]
fn skipped_rows_land_in_the_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("mixed.ndjson");
    let sidecar = dir.path().join("rejects.ndjson");
    std::fs::write(&data, "{\"title\":\"A\"}\nnot json\n{\"title\":\"B\"}\n").unwrap();

    let col = Arc::new(Collection::new("books"));
    let opts = ImportOptions { skip_errors: true, error_sidecar: Some(sidecar.clone()), ..ImportOptions::default() };
    let report = import_file(&col, &data, &opts).unwrap();
    assert_eq!((report.inserted, report.skipped), (2, 1));
    let rejects = std::fs::read_to_string(&sidecar).unwrap();
    assert_eq!(rejects.lines().count(), 1);
    assert!(rejects.contains("not json"));
}

#[test]
fn repeated_string_ids_in_one_file_are_skipped() {
    let col = Arc::new(Collection::new("books"));
    let data = "{\"_id\":\"book-1\",\"title\":\"A\"}\n{\"_id\":\"book-1\",\"title\":\"B\"}\n{\"_id\":\"book-2\",\"title\":\"C\"}\n";
    let strict = import_from_reader(&col, Cursor::new(data.as_bytes()), ImportFormat::Ndjson, &ImportOptions::default());
    assert!(strict.is_err());
    assert_eq!(col.len(), 1);

    let col = Arc::new(Collection::new("books"));
    let lenient = ImportOptions { skip_errors: true, ..ImportOptions::default() };
    let report = import_from_reader(&col, Cursor::new(data.as_bytes()), ImportFormat::Ndjson, &lenient).unwrap();
    assert_eq!((report.inserted, report.skipped), (2, 1));
    let titles: Vec<String> =
        col.get_all_documents().iter().map(|d| d.data.get_str("title").unwrap().to_string()).collect();
    assert_eq!(titles, vec!["A", "C"]);
}
