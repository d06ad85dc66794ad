//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define supervisor metrics (outcomes, handler latency, diagnostics)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `request_deadline_outcomes_total` (counter): supervised requests by outcome
//! - `request_deadline_handler_seconds` (histogram): time until the outcome was decided
//! - `request_deadline_superfluous_write_header_total` (counter): repeated `write_header` calls
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Outcome labels are a closed set of static strings

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Name of the counter tracking supervised request outcomes.
pub const OUTCOMES_TOTAL: &str = "request_deadline_outcomes_total";
/// Name of the histogram tracking time to outcome.
pub const HANDLER_SECONDS: &str = "request_deadline_handler_seconds";
/// Name of the counter tracking superfluous `write_header` calls.
pub const SUPERFLUOUS_WRITE_HEADER_TOTAL: &str = "request_deadline_superfluous_write_header_total";

/// Record the outcome of one supervised request.
pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    counter!(OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(HANDLER_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

/// Record a `write_header` call made after the status was already written.
pub fn record_superfluous_write_header() {
    counter!(SUPERFLUOUS_WRITE_HEADER_TOTAL).increment(1);
}

/// Install the global Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics endpoint listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn outcomes_are_labelled() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_outcome("timed_out", Duration::from_millis(20));
            record_outcome("timed_out", Duration::from_millis(30));
            record_outcome("completed", Duration::from_millis(1));
            record_superfluous_write_header();
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"request_deadline_outcomes_total{outcome="timed_out"} 2"#));
        assert!(rendered.contains(r#"request_deadline_outcomes_total{outcome="completed"} 1"#));
        assert!(rendered.contains("request_deadline_superfluous_write_header_total 1"));
    }
}
