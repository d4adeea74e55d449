//! The sixteen canned book statements, run on a fresh seeded collection.

use crate::books::{Books, PAGE_SIZE, sample_books};
use crate::collection::Collection;
use crate::query::Order;
use serde::Serialize;
use serde_json::{Value, json};
use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use super::runner::OutputMode;

fn to_value<T: Serialize>(v: &T) -> Result<Value, Box<dyn Error>> {
    Ok(serde_json::to_value(v)?)
}

/// Each entry is `(statement, result)`.
pub(crate) fn demo_results() -> Result<Vec<(&'static str, Value)>, Box<dyn Error>> {
    let books = Books::new(Arc::new(Collection::new(crate::books::COLLECTION)));
    books.insert_many(&sample_books())?;
    let mut out: Vec<(&'static str, Value)> = Vec::with_capacity(16);
    out.push((r#"find({genre: "Fiction"})"#, to_value(&books.by_genre("Fiction")?)?));
    out.push(("find({published_year: {$gt: 2000}})", to_value(&books.published_after(2000)?)?));
    out.push((r#"find({author: "George Orwell"})"#, to_value(&books.by_author("George Orwell")?)?));
    out.push((r#"updateOne({title: "1984"}, {$set: {price: 12.99}})"#, to_value(&books.set_price("1984", 12.99)?)?));
    out.push((r#"deleteOne({title: "The Road"})"#, to_value(&books.delete_by_title("The Road")?)?));
    out.push((
        "find({in_stock: true, published_year: {$gt: 2010}})",
        to_value(&books.in_stock_published_after(2010)?)?,
    ));
    out.push(("find({}, {title: 1, author: 1, price: 1, _id: 0})", to_value(&books.summaries()?)?));
    out.push(("find().sort({price: 1})", to_value(&books.sorted_by_price(Order::Asc)?)?));
    out.push(("find().sort({price: -1})", to_value(&books.sorted_by_price(Order::Desc)?)?));
    out.push((
        "find().limit(5) / find().skip(5).limit(5)",
        json!({
            "first_page": to_value(&books.page(0, PAGE_SIZE)?)?,
            "second_page": to_value(&books.page(PAGE_SIZE, PAGE_SIZE)?)?,
        }),
    ));
    out.push(("aggregate: average price by genre", to_value(&books.average_price_by_genre()?)?));
    out.push(("aggregate: most prolific author", to_value(&books.most_prolific_author()?)?));
    out.push(("aggregate: books per decade", to_value(&books.count_by_decade()?)?));
    out.push(("createIndex({title: 1})", Value::from(books.create_title_index()?)));
    out.push(("createIndex({author: 1, published_year: -1})", Value::from(books.create_author_year_index()?)));
    out.push((r#"find({title: "1984"}).explain("executionStats")"#, books.explain_title("1984")?.to_json()));
    Ok(out)
}

pub(crate) fn run_demo(mode: OutputMode, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let results = demo_results()?;
    match mode {
        OutputMode::Json => {
            let arr: Vec<Value> = results
                .into_iter()
                .enumerate()
                .map(|(i, (statement, result))| json!({ "n": i + 1, "statement": statement, "result": result }))
                .collect();
            writeln!(out, "{}", Value::Array(arr))?;
        }
        OutputMode::Plain => {
            for (i, (statement, result)) in results.into_iter().enumerate() {
                writeln!(out, "{}\t{statement}\t{result}", i + 1)?;
            }
        }
        OutputMode::Human => {
            for (i, (statement, result)) in results.into_iter().enumerate() {
                writeln!(out, "[{:>2}] {statement}", i + 1)?;
                writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_every_statement() {
        let results = demo_results().unwrap();
        assert_eq!(results.len(), 16);
        assert_eq!(results[3].1, json!({"matched": 1, "modified": 1}));
        assert_eq!(results[4].1, json!({"deleted": 1}));
        assert_eq!(results[9].1["second_page"].as_array().unwrap().len(), 5);
        assert_eq!(results[11].1["author"], json!("George Orwell"));
        assert_eq!(results[13].1, json!("title_1"));
        assert_eq!(results[15].1["queryPlanner"]["winningPlan"]["inputStage"]["indexName"], json!("title_1"));
    }

    #[test]
    fn plain_output_has_one_line_per_statement() {
        let mut buf = Vec::new();
        run_demo(OutputMode::Plain, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 16);
    }
}
