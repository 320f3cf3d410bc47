use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const EVENTS_SUBMITTED: &str = "events_submitted_total";
pub const EVENTS_REJECTED: &str = "events_rejected_total";
pub const EVENTS_PROCESSED: &str = "events_processed_total";
pub const EVENTS_EVICTED: &str = "events_evicted_total";
pub const STAGE_FAILURES: &str = "stage_failures_total";
pub const REDUCE_RUNS: &str = "reduce_runs_total";
pub const REDUCE_NO_DATA: &str = "reduce_no_data_total";
pub const REDUCE_UNREACHABLE: &str = "reduce_unreachable_total";
pub const GLOBAL_AVERAGE: &str = "global_average";
pub const REDUCE_LAST_RUN_TS: &str = "reduce_last_run_ts";
pub const REDUCE_DURATION_MS: &str = "reduce_duration_ms";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

// Descriptions go to whichever recorder is installed at call time.
fn describe_all() {
    describe_counter!(EVENTS_SUBMITTED, "Events accepted by the ingestion queue.");
    describe_counter!(
        EVENTS_REJECTED,
        "Events refused by the ingestion queue (full or closed)."
    );
    describe_counter!(EVENTS_PROCESSED, "Events folded into a node accumulator.");
    describe_counter!(EVENTS_EVICTED, "Events evicted from a node window.");
    describe_counter!(
        STAGE_FAILURES,
        "Batches dropped because the stage could not apply them."
    );
    describe_counter!(REDUCE_RUNS, "Global reduce cycles executed.");
    describe_counter!(REDUCE_NO_DATA, "Reduce cycles that found no data.");
    describe_counter!(
        REDUCE_UNREACHABLE,
        "Per-node queries that did not answer during a reduce."
    );
    describe_gauge!(GLOBAL_AVERAGE, "Most recent global windowed average.");
    describe_gauge!(REDUCE_LAST_RUN_TS, "Unix ts of the last reduce cycle.");
    describe_histogram!(REDUCE_DURATION_MS, "Reduce fan-out time in milliseconds.");
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    ///
    /// Describes every series again, since anything described before the
    /// recorder existed went nowhere.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
