// Telemetry is a submodule of query
pub mod telemetry;

mod builder;
mod cursor;
pub(crate) mod eval;
mod exec;
mod parse;
mod types;

pub use builder::Query;
pub use cursor::Cursor;
pub use eval::{compare_bson, compare_docs, eval_filter, project_fields, to_f64, values_equal};
pub use exec::{
    apply_update, count_docs, delete_many, delete_one, explain_find, find_docs, update_many,
    update_one,
};
pub use parse::{
    filter_to_value, parse_filter_json, parse_filter_value, parse_projection_json,
    parse_projection_value, parse_sort_json, parse_sort_value, parse_update_json,
    parse_update_value, validate_update,
};
pub use types::{
    CmpOp, DeleteReport, Filter, FindOptions, MAX_LIMIT, Order, Projection, SortSpec, UpdateDoc,
    UpdateReport,
};
pub(crate) use exec::arith;
pub(crate) use types::MAX_PROJECTION_FIELDS;
