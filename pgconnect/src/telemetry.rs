// Telemetry module for structured logging and query metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const QUERIES_TOTAL: &str = "pgconnect_queries_total";
pub const QUERY_DURATION_SECONDS: &str = "pgconnect_query_duration_seconds";

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over `log_level`. With `json` set, events are
/// written as JSON lines including the current span; otherwise the compact
/// human-readable format is used.
///
/// Statement logs emitted by sqlx go through the `log` facade and are
/// picked up by the subscriber's log bridge.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");

    Ok(())
}

/// Register metric descriptions with the installed recorder
///
/// The library never installs a recorder itself; call this after the
/// application has set one up.
pub fn describe_metrics() {
    describe_counter!(
        QUERIES_TOTAL,
        "Total number of statements issued by repositories"
    );
    describe_histogram!(
        QUERY_DURATION_SECONDS,
        "Duration of repository statements in seconds"
    );
}

/// Record one repository statement
#[inline]
pub fn record_query(operation: &'static str, table: &'static str, elapsed: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(QUERIES_TOTAL, "operation" => operation, "table" => table, "outcome" => outcome)
        .increment(1);
    histogram!(QUERY_DURATION_SECONDS, "operation" => operation, "table" => table)
        .record(elapsed.as_secs_f64());
}
