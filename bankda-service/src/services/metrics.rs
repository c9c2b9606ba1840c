//! Prometheus metrics for bankda-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for sync cycles by outcome.
pub static SYNC_CYCLES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankda_sync_cycles_total",
        "Total number of sync cycles",
        &["outcome"]
    )
    .expect("Failed to register SYNC_CYCLES")
});

/// Counter for ingested transaction rows by result.
pub static TRANSACTIONS_INGESTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankda_transactions_ingested_total",
        "Total number of transaction rows handled by sync cycles",
        &["result"]
    )
    .expect("Failed to register TRANSACTIONS_INGESTED")
});

/// Counter for match outcomes.
pub static TRANSACTION_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankda_transaction_matches_total",
        "Total number of match decisions",
        &["outcome"]
    )
    .expect("Failed to register TRANSACTION_MATCHES")
});

/// Counter for deposit crediting attempts.
pub static DEPOSIT_CREDITS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankda_deposit_credits_total",
        "Total number of deposit crediting attempts",
        &["source", "result"]
    )
    .expect("Failed to register DEPOSIT_CREDITS")
});

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bankda_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for errors by type.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankda_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_CYCLES);
    Lazy::force(&TRANSACTIONS_INGESTED);
    Lazy::force(&TRANSACTION_MATCHES);
    Lazy::force(&DEPOSIT_CREDITS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record one sync cycle outcome.
pub fn record_sync_cycle(outcome: &str) {
    SYNC_CYCLES.with_label_values(&[outcome]).inc();
}

/// Record one ingested row result.
pub fn record_ingested(result: &str) {
    TRANSACTIONS_INGESTED.with_label_values(&[result]).inc();
}

/// Record one match decision.
pub fn record_match(outcome: &str) {
    TRANSACTION_MATCHES.with_label_values(&[outcome]).inc();
}

/// Record one crediting attempt.
pub fn record_credit(source: &str, result: &str) {
    DEPOSIT_CREDITS.with_label_values(&[source, result]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
