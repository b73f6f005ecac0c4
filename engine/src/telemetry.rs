use ao_core::types::{AnalysisStatus, AttemptOutcome};
use metrics::{counter, gauge, histogram};

/// Metrics facade for the engine. All instruments carry the `engine_`
/// prefix so dashboards can scope on it.
#[derive(Debug, Default)]
pub struct EngineTelemetry {
    _phantom: std::marker::PhantomData<()>
}

impl EngineTelemetry {
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData
        }
    }

    pub fn record_cache_hit(&self) {
        counter!("engine_cache_lookups_total", "outcome" => "hit").increment(1);
    }

    pub fn record_cache_miss(&self) {
        counter!("engine_cache_lookups_total", "outcome" => "miss").increment(1);
    }

    pub fn record_cache_size(&self, entries: usize) {
        gauge!("engine_cache_entries").set(entries as f64);
    }

    pub fn record_provider_attempt(&self, outcome: AttemptOutcome) {
        counter!("engine_provider_attempts_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    pub fn record_dedup_join(&self) {
        counter!("engine_inflight_joins_total").increment(1);
    }

    pub fn record_analysis_dispatch(&self, intent: &str) {
        counter!("engine_analysis_dispatches_total",
            "intent" => intent.to_string()
        )
        .increment(1);
    }

    pub fn record_request(&self, status: AnalysisStatus, duration_ms: f64) {
        counter!("engine_requests_total",
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("engine_request_duration_seconds").record(duration_ms / 1000.0);
    }

    pub fn record_request_failure(&self, kind: &str) {
        counter!("engine_request_errors_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn record_session_count(&self, sessions: usize) {
        gauge!("engine_sessions_active").set(sessions as f64);
    }
}
