use crate::errors::DbError;
use crate::query::{parse_filter_value, parse_sort_value};
use crate::utils::json::json_to_bson;
use serde_json::{Map, Value};

use super::types::{
    Accumulator, Expr, GroupStage, MAX_PIPELINE_STAGES, Pipeline, ProjectField, Stage,
};
use crate::query::MAX_PROJECTION_FIELDS;

/// Parse a pipeline given as a JSON array of single-key stage documents.
///
/// # Errors
/// Returns `DbError::QueryError` for unknown stages, operators or malformed operands.
pub fn parse_pipeline_json(json: &str) -> Result<Pipeline, DbError> {
    let v: Value = serde_json::from_str(json)?;
    parse_pipeline_value(&v)
}

/// # Errors
/// See [`parse_pipeline_json`].
pub fn parse_pipeline_value(v: &Value) -> Result<Pipeline, DbError> {
    let arr = v.as_array().ok_or_else(|| DbError::query("pipeline must be a JSON array"))?;
    if arr.len() > MAX_PIPELINE_STAGES {
        return Err(DbError::query(format!("pipeline supports at most {MAX_PIPELINE_STAGES} stages")));
    }
    let stages = arr.iter().map(parse_stage).collect::<Result<Vec<_>, _>>()?;
    Ok(Pipeline { stages })
}

fn single_key<'a>(what: &str, v: &'a Value) -> Result<(&'a str, &'a Value), DbError> {
    match v.as_object() {
        Some(obj) if obj.len() == 1 => {
            let (k, val) = obj.iter().next().ok_or_else(|| DbError::query(format!("empty {what}")))?;
            Ok((k.as_str(), val))
        }
        _ => Err(DbError::query(format!("{what} must be an object with exactly one key"))),
    }
}

fn parse_stage(v: &Value) -> Result<Stage, DbError> {
    let (name, body) = single_key("pipeline stage", v)?;
    match name {
        "$match" => Ok(Stage::Match(parse_filter_value(body)?)),
        "$group" => parse_group(body).map(Stage::Group),
        "$sort" => {
            let keys = parse_sort_value(body)?;
            if keys.is_empty() {
                return Err(DbError::query("$sort requires at least one key"));
            }
            Ok(Stage::Sort(keys))
        }
        "$limit" => match positive(body) {
            Some(n) if n > 0 => Ok(Stage::Limit(n)),
            _ => Err(DbError::query("$limit must be a positive integer")),
        },
        "$skip" => positive(body)
            .map(Stage::Skip)
            .ok_or_else(|| DbError::query("$skip must be a non-negative integer")),
        "$project" => parse_project(body).map(Stage::Project),
        "$count" => match body.as_str() {
            Some(s) if !s.is_empty() && !s.starts_with('$') && !s.contains('.') => {
                Ok(Stage::Count(s.to_string()))
            }
            _ => Err(DbError::query("$count requires a plain field name")),
        },
        other => Err(DbError::query(format!("unsupported pipeline stage {other}"))),
    }
}

fn positive(v: &Value) -> Option<usize> {
    v.as_u64().and_then(|n| usize::try_from(n).ok())
}

fn parse_group(v: &Value) -> Result<GroupStage, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("$group must be an object"))?;
    let id = obj.get("_id").ok_or_else(|| DbError::query("$group requires an _id expression"))?;
    let mut group = GroupStage::by(parse_expr(id)?);
    for (name, spec) in obj.iter().filter(|(k, _)| k.as_str() != "_id") {
        if name.contains('.') {
            return Err(DbError::query(format!("$group field name {name} cannot contain '.'")));
        }
        group.fields.push((name.clone(), parse_accumulator(spec)?));
    }
    Ok(group)
}

fn parse_accumulator(v: &Value) -> Result<Accumulator, DbError> {
    let (op, arg) = single_key("accumulator", v)?;
    let e = parse_expr(arg)?;
    Ok(match op {
        "$sum" => Accumulator::Sum(e),
        "$avg" => Accumulator::Avg(e),
        "$min" => Accumulator::Min(e),
        "$max" => Accumulator::Max(e),
        "$first" => Accumulator::First(e),
        "$last" => Accumulator::Last(e),
        other => return Err(DbError::query(format!("unsupported accumulator {other}"))),
    })
}

fn parse_project(v: &Value) -> Result<Vec<(String, ProjectField)>, DbError> {
    let obj = v.as_object().ok_or_else(|| DbError::query("$project must be an object"))?;
    if obj.is_empty() || obj.len() > MAX_PROJECTION_FIELDS {
        return Err(DbError::query("$project requires between 1 and 64 fields"));
    }
    let mut out = Vec::with_capacity(obj.len());
    for (k, spec) in obj {
        let field = match spec {
            Value::Bool(b) => flag(*b),
            Value::Number(n) => flag(n.as_f64().is_some_and(|f| f != 0.0)),
            other => ProjectField::Computed(parse_expr(other)?),
        };
        out.push((k.clone(), field));
    }
    let excludes = out.iter().filter(|(k, f)| k != "_id" && *f == ProjectField::Exclude).count();
    let includes = out.iter().filter(|(_, f)| *f != ProjectField::Exclude).count();
    if excludes > 0 && includes > 0 {
        return Err(DbError::query("$project cannot mix inclusion and exclusion"));
    }
    Ok(out)
}

const fn flag(include: bool) -> ProjectField {
    if include { ProjectField::Include } else { ProjectField::Exclude }
}

/// Parse an expression: `"$path"`, an operator document, or a literal.
///
/// # Errors
/// Returns `DbError::QueryError` for unknown operators or wrong arity.
pub fn parse_expr(v: &Value) -> Result<Expr, DbError> {
    match v {
        Value::String(s) if s.starts_with("$$") => {
            Err(DbError::query(format!("variables are not supported ({s})")))
        }
        Value::String(s) if s.starts_with('$') => Ok(Expr::Field(s[1..].to_string())),
        Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => parse_operator(obj),
        Value::Object(_) => Err(DbError::query("expression objects must use an operator")),
        other => Ok(Expr::Literal(json_to_bson(other))),
    }
}

fn parse_operator(obj: &Map<String, Value>) -> Result<Expr, DbError> {
    if obj.len() != 1 {
        return Err(DbError::query("expression operator documents take exactly one key"));
    }
    let (op, arg) = obj.iter().next().ok_or_else(|| DbError::query("empty expression"))?;
    if op == "$literal" {
        return Ok(Expr::Literal(json_to_bson(arg)));
    }
    let args = operands(arg)?;
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(DbError::query(format!("{op} takes {n} argument(s), got {}", args.len())))
        }
    };
    match op.as_str() {
        "$divide" => {
            arity(2)?;
            Ok(Expr::divide(args[0].clone(), args[1].clone()))
        }
        "$subtract" => {
            arity(2)?;
            Ok(Expr::subtract(args[0].clone(), args[1].clone()))
        }
        "$floor" => {
            arity(1)?;
            Ok(Expr::floor(args[0].clone()))
        }
        "$toLower" => {
            arity(1)?;
            Ok(Expr::to_lower(args[0].clone()))
        }
        "$multiply" => Ok(Expr::Multiply(args)),
        "$add" => Ok(Expr::Add(args)),
        other => Err(DbError::query(format!("unsupported expression operator {other}"))),
    }
}

/// Operator arguments: an array, or a single bare operand.
fn operands(v: &Value) -> Result<Vec<Expr>, DbError> {
    match v {
        Value::Array(items) => items.iter().map(parse_expr).collect(),
        other => Ok(vec![parse_expr(other)?]),
    }
}
