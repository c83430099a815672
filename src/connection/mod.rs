// src/connection/mod.rs

//! Manages the lifecycle of a single WebSocket session: message decoding,
//! admission of identities, outbound delivery, and cleanup.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;
mod session;

// Publicly re-export the primary types from the sub-modules.
pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::SessionState;
