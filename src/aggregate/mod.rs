//! Aggregation pipelines: `$match`, `$group`, `$sort`, `$limit`, `$skip`, `$project`, `$count`.
mod exec;
mod parse;
mod types;

pub use exec::{aggregate, eval_expr, run_pipeline};
pub use parse::{parse_expr, parse_pipeline_json, parse_pipeline_value};
pub use types::{Accumulator, Expr, GroupStage, Pipeline, ProjectField, Stage};
