// src/core/protocol/mod.rs

//! The JSON wire protocol spoken over the WebSocket channel.

pub mod message;
pub mod value;

pub use message::{ClientMessage, ServerMessage};
pub use value::VariableValue;
