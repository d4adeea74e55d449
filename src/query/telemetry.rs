use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

pub const AUDIT_TARGET: &str = "shelfdb::audit";
pub const METRICS_TARGET: &str = "shelfdb::metrics";
pub const DEFAULT_SLOW_QUERY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub slow_query_ms: u64,
    pub enable_audit: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { slow_query_ms: DEFAULT_SLOW_QUERY_MS, enable_audit: true }
    }
}

#[derive(Default)]
pub struct Metrics {
    pub queries_total: AtomicU64,
    pub queries_slow_total: AtomicU64,
    pub writes_total: AtomicU64,
}

#[derive(Default)]
struct Telemetry {
    cfg: RwLock<TelemetryConfig>,
    metrics: Metrics,
    // tests can capture audit lines in memory
    audit_sink: RwLock<Option<Arc<RwLock<Vec<String>>>>>,
}

static TELEMETRY: LazyLock<Telemetry> = LazyLock::new(Telemetry::default);

pub fn set_slow_query_ms(ms: u64) {
    TELEMETRY.cfg.write().slow_query_ms = ms;
}

pub fn set_audit_enabled(enabled: bool) {
    TELEMETRY.cfg.write().enable_audit = enabled;
}

pub fn set_audit_sink_for_tests(sink: Arc<RwLock<Vec<String>>>) {
    *TELEMETRY.audit_sink.write() = Some(sink);
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Count a read query; queries at or above the slow threshold go to the metrics log.
pub fn log_query(collection: &str, op: &str, filter_dbg: &str, duration_ms: u128, returned: usize) {
    TELEMETRY.metrics.queries_total.fetch_add(1, Ordering::Relaxed);
    let threshold = TELEMETRY.cfg.read().slow_query_ms;
    let slow = u64::try_from(duration_ms).map_or(true, |ms| ms >= threshold);
    if !slow {
        return;
    }
    TELEMETRY.metrics.queries_slow_total.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "ts": now_ts(),
        "collection": collection,
        "op": op,
        "filter": filter_dbg,
        "duration_ms": u64::try_from(duration_ms).unwrap_or(u64::MAX),
        "returned": returned,
        "slow": true
    });
    log::warn!(target: METRICS_TARGET, "{line}");
}

/// One JSON line per document mutation.
pub fn log_audit(op: &str, collection: &str, doc_id: &str) {
    TELEMETRY.metrics.writes_total.fetch_add(1, Ordering::Relaxed);
    if !TELEMETRY.cfg.read().enable_audit {
        return;
    }
    let line = serde_json::json!({
        "ts": now_ts(), "op": op, "collection": collection, "doc_id": doc_id
    })
    .to_string();
    let sink = TELEMETRY.audit_sink.read().clone();
    if let Some(sink) = sink {
        sink.write().push(line.clone());
    }
    log::info!(target: AUDIT_TARGET, "{line}");
}

#[must_use]
pub fn metrics_text() -> String {
    let m = &TELEMETRY.metrics;
    format!(
        "shelfdb_queries_total {}\nshelfdb_queries_slow_total {}\nshelfdb_writes_total {}\n",
        m.queries_total.load(Ordering::Relaxed),
        m.queries_slow_total.load(Ordering::Relaxed),
        m.writes_total.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_lines_are_json() {
        let sink = Arc::new(RwLock::new(Vec::new()));
        set_audit_sink_for_tests(sink.clone());
        log_audit("insert", "telemetry_unit", "abc");
        let lines = sink.read().clone();
        let line = lines.iter().find(|l| l.contains("telemetry_unit")).unwrap();
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["op"], "insert");
        assert_eq!(v["doc_id"], "abc");
    }

    #[test]
    fn metrics_text_lists_counters() {
        log_query("telemetry_unit", "find", "True", 0, 0);
        assert!(metrics_text().contains("shelfdb_queries_total"));
    }
}
