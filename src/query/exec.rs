use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::explain::{ExecutionStats, ExplainReport, PlanStage, QueryPlanner, Verbosity};
use crate::index::{IndexKind, IndexScan, key_from_bson, lookup_eq, lookup_range};
use crate::types::DocumentId;
use crate::utils::num::{u128_to_u64_saturating, usize_to_u64};
use bson::Bson;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use super::cursor::Cursor;
use super::eval::{
    compare_bson, compare_docs, eval_filter, get_path, project_fields, set_path, to_f64, unset_path,
};
use super::parse::{filter_to_value, validate_update};
use super::telemetry;
use super::types::{
    CmpOp, DeleteReport, Filter, FindOptions, MAX_LIMIT, MAX_SORT_FIELDS, UpdateDoc, UpdateReport,
};

/// How an index will be scanned for a filter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IndexBounds {
    Eq(Bson),
    Range { min: Option<(Bson, bool)>, max: Option<(Bson, bool)> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexPlan {
    pub index_name: String,
    pub key_pattern: Value,
    pub bounds: IndexBounds,
}

#[derive(Debug, Default)]
struct ScanStats {
    plan: Option<IndexPlan>,
    keys_examined: usize,
    docs_examined: usize,
}

pub fn find_docs(col: &Arc<Collection>, filter: &Filter, opts: &FindOptions) -> Cursor {
    let bench_start = Instant::now();
    let (mut docs, stats) = matching_docs(col, filter);

    let cursor = if opts.projection.is_none() && opts.sort.is_none() {
        let ids: Vec<DocumentId> = paginate(docs, opts).into_iter().map(|d| d.id).collect();
        Cursor::from_ids(col.clone(), ids)
    } else {
        if let Some(sort) = &opts.sort {
            if sort.len() > MAX_SORT_FIELDS {
                log::warn!("sort spec too long: {}", sort.len());
            }
            let sort = &sort[..sort.len().min(MAX_SORT_FIELDS)];
            docs.sort_by(|a, b| compare_docs(&a.data, &b.data, sort));
        }
        let mut docs = paginate(docs, opts);
        if let Some(p) = &opts.projection {
            for d in &mut docs {
                d.data = project_fields(&d.data, p);
            }
        }
        Cursor::from_docs(col.clone(), docs)
    };

    let dur_ms = bench_start.elapsed().as_millis();
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"find\",\"collection\":\"{}\",\"duration_ms\":{},\"used_index\":{},\"result_count\":{},\"limit\":{},\"skip\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(dur_ms),
        stats.plan.is_some(),
        usize_to_u64(cursor.len()),
        usize_to_u64(opts.limit.unwrap_or(0)),
        usize_to_u64(opts.skip.unwrap_or(0))
    );
    telemetry::log_query(&col.name_str(), "find", &filter_to_value(filter).to_string(), dur_ms, cursor.len());
    cursor
}

#[must_use]
pub fn count_docs(col: &Arc<Collection>, filter: &Filter) -> usize {
    let start = Instant::now();
    let (docs, stats) = matching_docs(col, filter);
    let n = docs.len();
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"count\",\"collection\":\"{}\",\"duration_ms\":{},\"used_index\":{},\"result_count\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(start.elapsed().as_millis()),
        stats.plan.is_some(),
        usize_to_u64(n)
    );
    n
}

/// Run the plan the planner picks and report it. `QueryPlanner` verbosity only plans.
pub fn explain_find(
    col: &Arc<Collection>,
    filter: &Filter,
    opts: &FindOptions,
    verbosity: Verbosity,
) -> ExplainReport {
    let winning_plan = |plan: Option<&IndexPlan>| match plan {
        Some(p) => PlanStage::fetch_ixscan(p.index_name.clone(), p.key_pattern.clone()),
        None => PlanStage::collscan(),
    };
    let planner = |plan: Option<&IndexPlan>| QueryPlanner {
        namespace: format!("shelfdb.{}", col.name_str()),
        parsed_query: filter_to_value(filter),
        winning_plan: winning_plan(plan),
    };
    if verbosity == Verbosity::QueryPlanner {
        let plan = choose_index(col, filter);
        return ExplainReport { query_planner: planner(plan.as_ref()), execution_stats: None };
    }
    let start = Instant::now();
    let (docs, stats) = matching_docs(col, filter);
    let returned = paginate(docs, opts).len();
    let execution_stats = ExecutionStats {
        execution_success: true,
        n_returned: usize_to_u64(returned),
        execution_time_millis: u128_to_u64_saturating(start.elapsed().as_millis()),
        total_keys_examined: usize_to_u64(stats.keys_examined),
        total_docs_examined: usize_to_u64(stats.docs_examined),
    };
    ExplainReport { query_planner: planner(stats.plan.as_ref()), execution_stats: Some(execution_stats) }
}

/// # Errors
/// `QueryError` for invalid update documents or operators applied to non-numeric fields.
pub fn update_many(col: &Arc<Collection>, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
    validate_update(update)?;
    let bench_start = Instant::now();
    let (matched, modified) =
        col.modify_matching(false, |d| eval_filter(&d.data, filter), |doc| apply_update(doc, update))?;
    let report = UpdateReport { matched, modified };
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"update_many\",\"collection\":\"{}\",\"duration_ms\":{},\"matched\":{},\"modified\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(bench_start.elapsed().as_millis()),
        report.matched,
        report.modified
    );
    Ok(report)
}

/// Update the first matching document in natural order.
///
/// # Errors
/// See [`update_many`].
pub fn update_one(col: &Arc<Collection>, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
    validate_update(update)?;
    let bench_start = Instant::now();
    let (matched, modified) =
        col.modify_matching(true, |d| eval_filter(&d.data, filter), |doc| apply_update(doc, update))?;
    let report = UpdateReport { matched, modified };
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"update_one\",\"collection\":\"{}\",\"duration_ms\":{},\"matched\":{},\"modified\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(bench_start.elapsed().as_millis()),
        report.matched,
        report.modified
    );
    Ok(report)
}

pub fn delete_many(col: &Arc<Collection>, filter: &Filter) -> DeleteReport {
    let bench_start = Instant::now();
    let deleted = col.delete_matching(false, |d| eval_filter(&d.data, filter));
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"delete_many\",\"collection\":\"{}\",\"duration_ms\":{},\"deleted\":{}}}",
        col.name_str(),
        u128_to_u64_saturating(bench_start.elapsed().as_millis()),
        deleted
    );
    DeleteReport { deleted }
}

/// Delete the first matching document in natural order.
pub fn delete_one(col: &Arc<Collection>, filter: &Filter) -> DeleteReport {
    let deleted = col.delete_matching(true, |d| eval_filter(&d.data, filter));
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"delete_one\",\"collection\":\"{}\",\"deleted\":{}}}",
        col.name_str(),
        deleted
    );
    DeleteReport { deleted }
}

/// Apply `$set`, `$inc`, `$mul` then `$unset`. Returns whether the document changed;
/// `updated_at` is bumped only then.
///
/// # Errors
/// `QueryError` when `$inc`/`$mul` target a non-numeric value.
pub fn apply_update(doc: &mut Document, upd: &UpdateDoc) -> Result<bool, DbError> {
    let mut changed = false;
    for (k, v) in &upd.set {
        changed |= set_path(&mut doc.data, k, v.clone());
    }
    for (k, by) in &upd.inc {
        let next = match get_path(&doc.data, k) {
            None => by.clone(),
            Some(cur) => arith(cur, by, i64::checked_add, |a, b| a + b)
                .ok_or_else(|| DbError::query(format!("cannot apply $inc to non-numeric field {k}")))?,
        };
        changed |= set_path(&mut doc.data, k, next);
    }
    for (k, by) in &upd.mul {
        let next = match get_path(&doc.data, k) {
            None => zero_like(by),
            Some(cur) => arith(cur, by, i64::checked_mul, |a, b| a * b)
                .ok_or_else(|| DbError::query(format!("cannot apply $mul to non-numeric field {k}")))?,
        };
        changed |= set_path(&mut doc.data, k, next);
    }
    for k in &upd.unset {
        changed |= unset_path(&mut doc.data, k);
    }
    if changed {
        doc.touch();
    }
    Ok(changed)
}

fn as_int(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Integer arithmetic stays integral (`Int32` while both sides are `Int32` and it fits);
/// anything involving a double, or overflowing, is computed in `f64`.
pub(crate) fn arith(
    a: &Bson,
    b: &Bson,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<Bson> {
    if let (Some(x), Some(y)) = (as_int(a), as_int(b))
        && let Some(r) = int_op(x, y)
    {
        let both32 = matches!((a, b), (Bson::Int32(_), Bson::Int32(_)));
        return Some(match i32::try_from(r) {
            Ok(small) if both32 => Bson::Int32(small),
            _ => Bson::Int64(r),
        });
    }
    Some(Bson::Double(float_op(to_f64(a)?, to_f64(b)?)))
}

fn zero_like(v: &Bson) -> Bson {
    match v {
        Bson::Int32(_) => Bson::Int32(0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Double(0.0),
    }
}

fn paginate<T>(items: Vec<T>, opts: &FindOptions) -> Vec<T> {
    let skip = opts.skip.unwrap_or(0);
    let limit = match opts.limit {
        None | Some(0) => MAX_LIMIT,
        Some(n) => n.min(MAX_LIMIT),
    };
    items.into_iter().skip(skip).take(limit).collect()
}

/// Matching documents in natural order, through an index when one applies.
fn matching_docs(col: &Arc<Collection>, filter: &Filter) -> (Vec<Document>, ScanStats) {
    let mut stats = ScanStats::default();
    let candidates = choose_index(col, filter).and_then(|plan| {
        let scan = run_index_plan(col, &plan)?;
        stats.plan = Some(plan);
        Some(scan)
    });
    let docs = match candidates {
        Some(IndexScan { ids, keys_examined }) => {
            stats.keys_examined = keys_examined;
            let ids = col.natural_order(ids);
            stats.docs_examined = ids.len();
            ids.iter()
                .filter_map(|id| col.find_document(id))
                .filter(|d| eval_filter(&d.data, filter))
                .collect()
        }
        None => {
            let all = col.get_all_documents();
            stats.docs_examined = all.len();
            all.into_iter().filter(|d| eval_filter(&d.data, filter)).collect()
        }
    };
    (docs, stats)
}

/// Top-level conjuncts of a filter, flattening nested `$and`.
fn conjuncts(filter: &Filter) -> Vec<&Filter> {
    match filter {
        Filter::And(fs) => fs.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

/// Pick an index whose leading field carries an equality or range predicate.
/// Equality beats range, then more key fields, then index name order.
pub(crate) fn choose_index(col: &Arc<Collection>, filter: &Filter) -> Option<IndexPlan> {
    let preds = conjuncts(filter);
    let mgr = col.indexes.read();
    let mut best: Option<((bool, usize), IndexPlan)> = None;
    for (name, idx) in &mgr.indexes {
        let spec = idx.spec();
        let field = spec.leading_field();
        let bounds = eq_bound(&preds, field).map(IndexBounds::Eq).or_else(|| {
            if spec.kind == IndexKind::BTree { range_bounds(&preds, field) } else { None }
        });
        let Some(bounds) = bounds else { continue };
        let rank = (matches!(bounds, IndexBounds::Eq(_)), spec.keys.len());
        if best.as_ref().is_none_or(|(r, _)| rank > *r) {
            let plan = IndexPlan { index_name: name.clone(), key_pattern: spec.key_pattern(), bounds };
            best = Some((rank, plan));
        }
    }
    best.map(|(_, p)| p)
}

fn eq_bound(preds: &[&Filter], field: &str) -> Option<Bson> {
    preds.iter().find_map(|f| match f {
        Filter::Cmp { path, op: CmpOp::Eq, value } if path == field && key_from_bson(value).is_some() => {
            Some(value.clone())
        }
        _ => None,
    })
}

fn range_bounds(preds: &[&Filter], field: &str) -> Option<IndexBounds> {
    let mut min: Option<(Bson, bool)> = None;
    let mut max: Option<(Bson, bool)> = None;
    for f in preds {
        let Filter::Cmp { path, op, value } = f else { continue };
        if path != field || !op.is_range() || key_from_bson(value).is_none() {
            continue;
        }
        let inclusive = matches!(op, CmpOp::Gte | CmpOp::Lte);
        let lower = matches!(op, CmpOp::Gt | CmpOp::Gte);
        let want = if lower { Ordering::Greater } else { Ordering::Less };
        let slot = if lower { &mut min } else { &mut max };
        let tighter = match slot.as_ref() {
            None => true,
            Some((cur, cur_incl)) => match compare_bson(value, cur) {
                Ordering::Equal => *cur_incl && !inclusive,
                o => o == want,
            },
        };
        if tighter {
            *slot = Some((value.clone(), inclusive));
        }
    }
    (min.is_some() || max.is_some()).then_some(IndexBounds::Range { min, max })
}

fn run_index_plan(col: &Arc<Collection>, plan: &IndexPlan) -> Option<IndexScan> {
    let mut mgr = col.indexes.write();
    match &plan.bounds {
        IndexBounds::Eq(v) => lookup_eq(&mut mgr, &plan.index_name, v),
        IndexBounds::Range { min, max } => lookup_range(
            &mut mgr,
            &plan.index_name,
            min.as_ref().map(|(b, _)| b),
            max.as_ref().map(|(b, _)| b),
            min.as_ref().is_some_and(|(_, i)| *i),
            max.as_ref().is_some_and(|(_, i)| *i),
        ),
    }
}
