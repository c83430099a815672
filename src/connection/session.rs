// src/connection/session.rs

//! Defines the state associated with a single client session.

use std::time::{Duration, Instant};

/// Holds the state specific to a single client session.
#[derive(Debug)]
pub struct SessionState {
    /// The identity announced in the handshake, if any.
    pub identity: Option<String>,
    /// The project the client announced in the handshake, if any.
    pub project_id: Option<String>,
    pub connected_at: Instant,
    /// Last time any frame (including a Pong) arrived from the peer.
    pub last_activity: Instant,
    /// Number of `set` messages this session has applied.
    pub sets_applied: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            identity: None,
            project_id: None,
            connected_at: now,
            last_activity: now,
            sets_applied: 0,
        }
    }

    /// Records the fields of a `handshake` message. A handshake without a
    /// `user` keeps any identity announced earlier.
    pub fn record_handshake(&mut self, user: Option<String>, project_id: Option<String>) {
        if user.is_some() {
            self.identity = user;
        }
        if project_id.is_some() {
            self.project_id = project_id;
        }
    }

    /// The identity a message is judged by: its own `user` field if it has
    /// one, otherwise the handshake identity.
    pub fn effective_identity<'a>(&'a self, message_user: Option<&'a str>) -> Option<&'a str> {
        message_user.or(self.identity.as_deref())
    }

    /// Every identity a message can be held to: its own `user` field and the
    /// handshake identity. A deny-listed entry in either rejects the message.
    pub fn identities<'a>(&'a self, message_user: Option<&'a str>) -> impl Iterator<Item = &'a str> {
        message_user.into_iter().chain(self.identity.as_deref())
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
