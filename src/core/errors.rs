// src/core/errors.rs

//! Defines the primary error type for the relay.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures the core can report.
/// None of these are fatal to the process; each one is handled at the
/// boundary of the operation that produced it.
#[derive(Error, Debug)]
pub enum CloudVarError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// A connection or message was rejected by a deny-list.
    #[error("Policy violation: {0}")]
    PolicyDenied(String),

    /// An inbound frame could not be decoded into a message.
    #[error("Malformed message: {0}")]
    Decode(String),

    /// The variable table could not be written to durable storage.
    #[error("Persistence Error: {0}")]
    Persistence(String),

    /// An update could not be queued for the given session.
    #[error("Delivery to session {0} failed")]
    Delivery(u64),

    #[error("JSON Error: {0}")]
    Json(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for CloudVarError {
    fn clone(&self) -> Self {
        match self {
            CloudVarError::Io(e) => CloudVarError::Io(Arc::clone(e)),
            CloudVarError::PolicyDenied(s) => CloudVarError::PolicyDenied(s.clone()),
            CloudVarError::Decode(s) => CloudVarError::Decode(s.clone()),
            CloudVarError::Persistence(s) => CloudVarError::Persistence(s.clone()),
            CloudVarError::Delivery(id) => CloudVarError::Delivery(*id),
            CloudVarError::Json(s) => CloudVarError::Json(s.clone()),
            CloudVarError::Config(s) => CloudVarError::Config(s.clone()),
            CloudVarError::Internal(s) => CloudVarError::Internal(s.clone()),
        }
    }
}

impl PartialEq for CloudVarError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CloudVarError::Io(e1), CloudVarError::Io(e2)) => e1.to_string() == e2.to_string(),
            (CloudVarError::PolicyDenied(a), CloudVarError::PolicyDenied(b)) => a == b,
            (CloudVarError::Decode(a), CloudVarError::Decode(b)) => a == b,
            (CloudVarError::Persistence(a), CloudVarError::Persistence(b)) => a == b,
            (CloudVarError::Delivery(a), CloudVarError::Delivery(b)) => a == b,
            (CloudVarError::Json(a), CloudVarError::Json(b)) => a == b,
            (CloudVarError::Config(a), CloudVarError::Config(b)) => a == b,
            (CloudVarError::Internal(a), CloudVarError::Internal(b)) => a == b,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for CloudVarError {
    fn from(e: std::io::Error) -> Self {
        CloudVarError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for CloudVarError {
    fn from(e: serde_json::Error) -> Self {
        CloudVarError::Json(e.to_string())
    }
}

impl From<axum::Error> for CloudVarError {
    fn from(e: axum::Error) -> Self {
        CloudVarError::Io(Arc::new(std::io::Error::other(e)))
    }
}
