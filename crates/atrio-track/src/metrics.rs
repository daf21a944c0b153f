//! Observability metrics for the tracking pipeline.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `atrio_track_requests_total` | Counter | `outcome` | Tracking requests by outcome |
//! | `atrio_track_events_total` | Counter | - | Events accepted for processing |
//! | `atrio_track_stage_failures_total` | Counter | `stage` | Best-effort stage failures |
//! | `atrio_track_request_duration_seconds` | Histogram | - | End-to-end request latency |
//! | `atrio_track_validator_cache_total` | Counter | `result` | Validator cache lookups |
//!
//! Metrics are exposed via the `metrics` crate facade; install a recorder
//! such as `metrics_exporter_prometheus` at process startup to export them.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Tracking requests by outcome.
    pub const REQUESTS_TOTAL: &str = "atrio_track_requests_total";
    /// Counter: Events accepted for processing.
    pub const EVENTS_TOTAL: &str = "atrio_track_events_total";
    /// Counter: Best-effort stage failures.
    pub const STAGE_FAILURES_TOTAL: &str = "atrio_track_stage_failures_total";
    /// Histogram: End-to-end request latency in seconds.
    pub const REQUEST_DURATION_SECONDS: &str = "atrio_track_request_duration_seconds";
    /// Counter: Validator cache lookups by result.
    pub const VALIDATOR_CACHE_TOTAL: &str = "atrio_track_validator_cache_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Request outcome (accepted, unauthorized, invalid, conflict, storage).
    pub const OUTCOME: &str = "outcome";
    /// Pipeline stage name (workflow, merge, profile_update, background).
    pub const STAGE: &str = "stage";
    /// Lookup result (hit, miss).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording tracking metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct TrackMetrics {
    /// Optional prefix for metric names (for multi-tenant deployments).
    _prefix: Option<String>,
}

impl TrackMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed tracking request.
    ///
    /// Increments the `atrio_track_requests_total` counter with the outcome.
    pub fn record_request(&self, outcome: &str) {
        counter!(
            names::REQUESTS_TOTAL,
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
    }

    /// Records events accepted for processing.
    ///
    /// Increments the `atrio_track_events_total` counter.
    pub fn record_events(&self, count: usize) {
        counter!(names::EVENTS_TOTAL).increment(count as u64);
    }

    /// Records a best-effort stage failure.
    ///
    /// Increments the `atrio_track_stage_failures_total` counter.
    pub fn record_stage_failure(&self, stage: &str) {
        counter!(
            names::STAGE_FAILURES_TOTAL,
            labels::STAGE => stage.to_string(),
        )
        .increment(1);
    }

    /// Records end-to-end request latency.
    ///
    /// Records the duration in the `atrio_track_request_duration_seconds`
    /// histogram.
    pub fn observe_request_duration(&self, duration: Duration) {
        histogram!(names::REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records a validator cache lookup.
    ///
    /// Increments the `atrio_track_validator_cache_total` counter.
    pub fn record_validator_cache(&self, result: &str) {
        counter!(
            names::VALIDATOR_CACHE_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped, so early returns and errors
/// are timed the same as successful paths.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed
    /// duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Creates a timing guard for request latency.
#[must_use]
pub fn time_track_request() -> TimingGuard<impl FnOnce(Duration)> {
    TimingGuard::new(|duration| {
        histogram!(names::REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
    })
}
