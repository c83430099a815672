// src/core/mod.rs

//! The central module containing the core logic and data structures of the
//! cloud variable relay.

pub mod errors;
pub mod hub;
pub mod log_sink;
pub mod metrics;
pub mod persistence;
pub mod policy;
pub mod protocol;
pub mod state;
pub mod storage;

pub use errors::CloudVarError;
pub use protocol::{ClientMessage, ServerMessage, VariableValue};
