//! Explain reports for `find`, rendered in the Mongo `explain()` JSON layout.
use crate::errors::DbError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Plan selection only; the query is not executed.
    QueryPlanner,
    #[default]
    ExecutionStats,
}

impl FromStr for Verbosity {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queryPlanner" => Ok(Self::QueryPlanner),
            "executionStats" => Ok(Self::ExecutionStats),
            other => Err(DbError::QueryError(format!("unsupported explain verbosity {other}"))),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueryPlanner => "queryPlanner",
            Self::ExecutionStats => "executionStats",
        })
    }
}

/// One node of the winning plan tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStage {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pattern: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stage: Option<Box<PlanStage>>,
}

impl PlanStage {
    #[must_use]
    pub fn collscan() -> Self {
        Self {
            stage: "COLLSCAN".into(),
            index_name: None,
            key_pattern: None,
            direction: Some("forward".into()),
            input_stage: None,
        }
    }

    /// `FETCH` over an `IXSCAN` of the named index.
    #[must_use]
    pub fn fetch_ixscan(index_name: String, key_pattern: Value) -> Self {
        let ixscan = Self {
            stage: "IXSCAN".into(),
            index_name: Some(index_name),
            key_pattern: Some(key_pattern),
            direction: Some("forward".into()),
            input_stage: None,
        };
        Self {
            stage: "FETCH".into(),
            index_name: None,
            key_pattern: None,
            direction: None,
            input_stage: Some(Box::new(ixscan)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlanner {
    pub namespace: String,
    pub parsed_query: Value,
    pub winning_plan: PlanStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub execution_success: bool,
    pub n_returned: u64,
    pub execution_time_millis: u64,
    pub total_keys_examined: u64,
    pub total_docs_examined: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReport {
    pub query_planner: QueryPlanner,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<ExecutionStats>,
}

impl ExplainReport {
    /// Stage at the root of the winning plan (`COLLSCAN` or `FETCH`).
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.query_planner.winning_plan.stage
    }

    /// Name of the index scanned by the winning plan, if any.
    #[must_use]
    pub fn index_name(&self) -> Option<&str> {
        let mut cur = &self.query_planner.winning_plan;
        loop {
            if let Some(name) = cur.index_name.as_deref() {
                return Some(name);
            }
            cur = cur.input_stage.as_deref()?;
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
