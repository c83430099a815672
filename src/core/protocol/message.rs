// src/core/protocol/message.rs

//! Decoding of inbound client frames and encoding of outbound updates.
//!
//! Every frame is a single JSON object tagged by its `method` field. Clients
//! may attach extra fields (`user`, `project_id`, ...) which are tolerated.

use super::value::VariableValue;
use crate::core::CloudVarError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded client-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Announces the client. Carries the self-reported identity, if any.
    Handshake {
        user: Option<String>,
        project_id: Option<String>,
    },
    /// Sets `name` to `value`. `user` is the identity attached to this
    /// particular message, if the client sent one.
    Set {
        name: String,
        value: VariableValue,
        user: Option<String>,
    },
    /// A well-formed frame with a method the server does not handle.
    Unknown(String),
}

/// The loosely-typed shape of an inbound frame, before validation.
#[derive(Deserialize)]
struct RawMessage {
    method: Option<Value>,
    name: Option<Value>,
    value: Option<Value>,
    user: Option<Value>,
    project_id: Option<Value>,
}

impl ClientMessage {
    /// Decodes a text frame. Errors are always `CloudVarError::Decode` and
    /// affect only this frame.
    pub fn decode(text: &str) -> Result<Self, CloudVarError> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| CloudVarError::Decode(format!("invalid JSON: {e}")))?;
        if !parsed.is_object() {
            return Err(CloudVarError::Decode("frame is not a JSON object".into()));
        }
        let raw: RawMessage = serde_json::from_value(parsed)
            .map_err(|e| CloudVarError::Decode(format!("invalid message: {e}")))?;

        let method = match raw.method {
            Some(Value::String(m)) => m,
            Some(_) => return Err(CloudVarError::Decode("method must be a string".into())),
            None => return Err(CloudVarError::Decode("missing method".into())),
        };

        match method.as_str() {
            "handshake" => Ok(ClientMessage::Handshake {
                user: identity_field(raw.user),
                project_id: raw.project_id.and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
            }),
            "set" => {
                let name = match raw.name {
                    Some(Value::String(n)) if !n.is_empty() => n,
                    Some(Value::String(_)) => {
                        return Err(CloudVarError::Decode("set: name is empty".into()));
                    }
                    Some(_) => return Err(CloudVarError::Decode("set: name must be a string".into())),
                    None => return Err(CloudVarError::Decode("set: missing name".into())),
                };
                // `"value": null` deserializes to `None` and is rejected here too.
                let value = raw
                    .value
                    .ok_or_else(|| CloudVarError::Decode("set: missing value".into()))
                    .and_then(VariableValue::try_from)?;
                Ok(ClientMessage::Set {
                    name,
                    value,
                    user: identity_field(raw.user),
                })
            }
            _ => Ok(ClientMessage::Unknown(method)),
        }
    }

    /// The method name, for logging.
    pub fn method(&self) -> &str {
        match self {
            ClientMessage::Handshake { .. } => "handshake",
            ClientMessage::Set { .. } => "set",
            ClientMessage::Unknown(m) => m,
        }
    }
}

fn identity_field(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ServerMessage {
    Set { name: String, value: VariableValue },
}

impl ServerMessage {
    pub fn set(name: impl Into<String>, value: VariableValue) -> Self {
        ServerMessage::Set {
            name: name.into(),
            value,
        }
    }

    /// Serializes the message into the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, CloudVarError> {
        Ok(serde_json::to_string(self)?)
    }
}
