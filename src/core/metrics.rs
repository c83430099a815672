// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of sessions currently registered with the broadcast hub.
    pub static ref CONNECTED_SESSIONS: Gauge =
        register_gauge!("cloudvar_connected_sessions", "Number of currently connected sessions.").unwrap();

    // --- Counters ---
    /// The total number of WebSocket connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("cloudvar_connections_received_total", "Total number of connections received.").unwrap();
    /// Connections and sessions closed by the access policy.
    pub static ref POLICY_DENIALS_TOTAL: Counter =
        register_counter!("cloudvar_policy_denials_total", "Total number of connections or messages rejected by a deny-list.").unwrap();
    pub static ref SETS_APPLIED_TOTAL: Counter =
        register_counter!("cloudvar_sets_applied_total", "Total number of set operations applied to the store.").unwrap();
    pub static ref PERSISTENCE_FAILURES_TOTAL: Counter =
        register_counter!("cloudvar_persistence_failures_total", "Total number of failed snapshot writes.").unwrap();
    pub static ref DELIVERY_FAILURES_TOTAL: Counter =
        register_counter!("cloudvar_delivery_failures_total", "Total number of updates that could not be queued for a session.").unwrap();
    pub static ref DECODE_ERRORS_TOTAL: Counter =
        register_counter!("cloudvar_decode_errors_total", "Total number of inbound frames dropped as malformed.").unwrap();

    // --- Histograms ---
    /// Time spent in one set + persist + publish step.
    pub static ref SET_LATENCY_SECONDS: Histogram =
        register_histogram!("cloudvar_set_latency_seconds", "Latency of set processing in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
