// src/core/state/stats.rs

//! Contains state definitions and logic for server statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds server-wide counters. Unlike the Prometheus metrics these are
/// per-`ServerState`, so they stay exact when several servers share a process.
#[derive(Debug)]
pub struct StatsState {
    /// The total number of connections received since startup.
    total_connections: AtomicU64,
    /// Connections closed because of the IP deny-list.
    rejected_connections: AtomicU64,
    /// Sessions closed because a message carried a denied identity.
    rejected_messages: AtomicU64,
    /// Inbound frames dropped as malformed.
    decode_errors: AtomicU64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsState {
    /// Creates a new `StatsState` with initialized counters.
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            rejected_messages: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Atomically increments the total number of connections received.
    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of connections received.
    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_rejected_connections(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rejected_connections(&self) -> u64 {
        self.rejected_connections.load(Ordering::Relaxed)
    }

    pub fn increment_rejected_messages(&self) {
        self.rejected_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rejected_messages(&self) -> u64 {
        self.rejected_messages.load(Ordering::Relaxed)
    }

    pub fn increment_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}
