//! Observability infrastructure for Atrio.
//!
//! Structured logging with consistent spans. This module provides the
//! logging bootstrap and span constructors used by every component so that
//! log lines from the tracker correlate on the same fields.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `atrio_track=debug`)
///
/// # Example
///
/// ```rust
/// use atrio_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for tracking-pipeline operations with standard fields.
///
/// # Example
///
/// ```rust
/// use atrio_core::observability::track_span;
///
/// let span = track_span("track", "src-web", "sess-1");
/// let _guard = span.enter();
/// // ... run pipeline stage
/// ```
#[must_use]
pub fn track_span(operation: &str, source_id: &str, session_id: &str) -> Span {
    tracing::info_span!(
        "track",
        op = operation,
        source_id = source_id,
        session_id = session_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        // Should not panic (uses Once internally)
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn track_span_creates_span() {
        let span = track_span("track", "src-1", "sess-1");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
