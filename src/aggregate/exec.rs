use crate::collection::Collection;
use crate::errors::DbError;
use crate::index::{IndexKeyKind, key_from_bson};
use crate::query::{arith, compare_bson, compare_docs, eval_filter, to_f64};
use crate::query::eval::get_path;
use crate::utils::num::{u128_to_u64_saturating, usize_to_u64};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::types::{Accumulator, Expr, GroupStage, MAX_PIPELINE_STAGES, Pipeline, ProjectField, Stage};

/// Run a pipeline over the collection's documents in natural order.
///
/// # Errors
/// `QueryError` from expression evaluation (e.g. division by zero) or oversized pipelines.
pub fn aggregate(col: &Arc<Collection>, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError> {
    let start = Instant::now();
    let input: Vec<BsonDocument> = col.get_all_documents().into_iter().map(|d| d.data).collect();
    let out = run_pipeline(input, pipeline)?;
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"aggregate\",\"collection\":\"{}\",\"duration_ms\":{},\"stages\":{},\"result_count\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(start.elapsed().as_millis()),
        usize_to_u64(pipeline.stages.len()),
        usize_to_u64(out.len())
    );
    Ok(out)
}

/// Apply each stage in order to an in-memory batch.
///
/// # Errors
/// See [`aggregate`].
pub fn run_pipeline(mut docs: Vec<BsonDocument>, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError> {
    if pipeline.stages.len() > MAX_PIPELINE_STAGES {
        return Err(DbError::query(format!("pipeline supports at most {MAX_PIPELINE_STAGES} stages")));
    }
    for stage in &pipeline.stages {
        log::trace!("aggregate stage {} over {} documents", stage.name(), docs.len());
        docs = match stage {
            Stage::Match(f) => docs.into_iter().filter(|d| eval_filter(d, f)).collect(),
            Stage::Group(g) => group(docs, g)?,
            Stage::Sort(keys) => {
                docs.sort_by(|a, b| compare_docs(a, b, keys));
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Project(fields) => docs.iter().map(|d| project(d, fields)).collect::<Result<_, _>>()?,
            Stage::Count(name) => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = BsonDocument::new();
                    out.insert(name.clone(), count_value(docs.len()));
                    vec![out]
                }
            }
        };
    }
    Ok(docs)
}

fn count_value(n: usize) -> Bson {
    i32::try_from(n).map_or_else(|_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Bson::Int32)
}

/// Evaluate an expression against one document. Missing fields evaluate to null.
///
/// # Errors
/// `QueryError` on division by zero.
pub fn eval_expr(doc: &BsonDocument, expr: &Expr) -> Result<Bson, DbError> {
    Ok(match expr {
        Expr::Field(path) => get_path(doc, path).cloned().unwrap_or(Bson::Null),
        Expr::Literal(v) => v.clone(),
        Expr::Divide(a, b) => {
            let (x, y) = (eval_expr(doc, a)?, eval_expr(doc, b)?);
            match (to_f64(&x), to_f64(&y)) {
                (Some(_), Some(d)) if d == 0.0 => return Err(DbError::query("$divide by zero")),
                (Some(n), Some(d)) => Bson::Double(n / d),
                _ => Bson::Null,
            }
        }
        Expr::Floor(a) => match eval_expr(doc, a)? {
            Bson::Double(f) => Bson::Double(f.floor()),
            v @ (Bson::Int32(_) | Bson::Int64(_)) => v,
            _ => Bson::Null,
        },
        Expr::Multiply(items) => fold(doc, items, Bson::Int32(1), i64::checked_mul, |a, b| a * b)?,
        Expr::Add(items) => fold(doc, items, Bson::Int32(0), i64::checked_add, |a, b| a + b)?,
        Expr::Subtract(a, b) => {
            let (x, y) = (eval_expr(doc, a)?, eval_expr(doc, b)?);
            arith(&x, &y, i64::checked_sub, |a, b| a - b).unwrap_or(Bson::Null)
        }
        Expr::ToLower(a) => match eval_expr(doc, a)? {
            Bson::String(s) => Bson::String(s.to_lowercase()),
            Bson::Null => Bson::String(String::new()),
            v @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => Bson::String(v.to_string()),
            _ => Bson::Null,
        },
    })
}

fn fold(
    doc: &BsonDocument,
    items: &[Expr],
    init: Bson,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Bson, DbError> {
    let mut acc = init;
    for e in items {
        let v = eval_expr(doc, e)?;
        match arith(&acc, &v, int_op, float_op) {
            Some(next) => acc = next,
            None => return Ok(Bson::Null),
        }
    }
    Ok(acc)
}

/// Group identity: numbers compare by value, so `1` and `1.0` share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Scalar(IndexKeyKind),
    Other(String),
}

impl From<&Bson> for GroupKey {
    fn from(v: &Bson) -> Self {
        key_from_bson(v).map_or_else(|| Self::Other(format!("{v:?}")), Self::Scalar)
    }
}

#[derive(Debug, Clone)]
enum AccState {
    Sum(Bson),
    Avg { total: f64, n: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => Self::Sum(Bson::Int32(0)),
            Accumulator::Avg(_) => Self::Avg { total: 0.0, n: 0 },
            Accumulator::Min(_) => Self::Min(None),
            Accumulator::Max(_) => Self::Max(None),
            Accumulator::First(_) => Self::First(None),
            Accumulator::Last(_) => Self::Last(Bson::Null),
        }
    }

    fn push(&mut self, v: Bson) {
        match self {
            Self::Sum(total) => {
                if to_f64(&v).is_some()
                    && let Some(next) = arith(total, &v, i64::checked_add, |a, b| a + b)
                {
                    *total = next;
                }
            }
            Self::Avg { total, n } => {
                if let Some(f) = to_f64(&v) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Min(cur) => keep_if(cur, v, Ordering::Less),
            Self::Max(cur) => keep_if(cur, v, Ordering::Greater),
            Self::First(cur) => {
                if cur.is_none() {
                    *cur = Some(v);
                }
            }
            Self::Last(cur) => *cur = v,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum(total) => total,
            Self::Avg { n: 0, .. } => Bson::Null,
            Self::Avg { total, n } => Bson::Double(total / n as f64),
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Bson::Null),
            Self::Last(v) => v,
        }
    }
}

/// `$min`/`$max` ignore nulls.
fn keep_if(cur: &mut Option<Bson>, v: Bson, want: Ordering) {
    if matches!(v, Bson::Null) {
        return;
    }
    if cur.as_ref().is_none_or(|c| compare_bson(&v, c) == want) {
        *cur = Some(v);
    }
}

fn operand(acc: &Accumulator) -> &Expr {
    match acc {
        Accumulator::Sum(e)
        | Accumulator::Avg(e)
        | Accumulator::Min(e)
        | Accumulator::Max(e)
        | Accumulator::First(e)
        | Accumulator::Last(e) => e,
    }
}

/// Groups come out in order of first appearance.
fn group(docs: Vec<BsonDocument>, g: &GroupStage) -> Result<Vec<BsonDocument>, DbError> {
    let mut slots: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for d in &docs {
        let key = eval_expr(d, &g.id)?;
        let slot = *slots.entry(GroupKey::from(&key)).or_insert_with(|| {
            groups.push((key, g.fields.iter().map(|(_, a)| AccState::new(a)).collect()));
            groups.len() - 1
        });
        for ((_, acc), state) in g.fields.iter().zip(groups[slot].1.iter_mut()) {
            state.push(eval_expr(d, operand(acc))?);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for ((name, _), state) in g.fields.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect())
}

fn project(doc: &BsonDocument, fields: &[(String, ProjectField)]) -> Result<BsonDocument, DbError> {
    let inclusion = fields.iter().any(|(k, f)| k != "_id" && *f != ProjectField::Exclude);
    if !inclusion {
        let mut out = doc.clone();
        for (k, _) in fields {
            crate::query::eval::unset_path(&mut out, k);
        }
        return Ok(out);
    }
    let mut out = BsonDocument::new();
    let keep_id = !fields.iter().any(|(k, f)| k == "_id" && *f == ProjectField::Exclude);
    if keep_id && let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for (k, f) in fields {
        match f {
            ProjectField::Include if k != "_id" => {
                if let Some(v) = get_path(doc, k) {
                    crate::query::eval::set_path(&mut out, k, v.clone());
                }
            }
            ProjectField::Computed(e) => {
                crate::query::eval::set_path(&mut out, k, eval_expr(doc, e)?);
            }
            _ => {}
        }
    }
    Ok(out)
}
