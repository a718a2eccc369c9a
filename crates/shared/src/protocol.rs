//! Groupcast wire-protocol envelopes.
//!
//! Every transport message carries exactly one JSON envelope with a `type`
//! discriminator. Outbound envelopes are the closed [`ClientRequest`] set.
//! Inbound traffic is classified by shape into a [`ServerPayload`] instead of
//! being deserialized into a closed enum, because broadcast bodies are
//! application-defined and are passed through to subscribers verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Envelopes a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Login handshake, sent once per connection when the socket opens.
    #[serde(rename_all = "camelCase")]
    Login {
        nick_name: String,
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
    },
    /// Application message, only valid after a successful login.
    #[serde(rename_all = "camelCase")]
    Message {
        token: String,
        nick_name: String,
        auth: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
        message: Value,
    },
}

impl ClientRequest {
    /// Build a login envelope. The group is omitted from the wire when unset.
    pub fn login(
        nick_name: impl Into<String>,
        token: impl Into<String>,
        group_name: Option<String>,
    ) -> Self {
        Self::Login {
            nick_name: nick_name.into(),
            token: token.into(),
            group_name,
        }
    }

    /// Build a message envelope carrying an arbitrary JSON body.
    pub fn message(
        token: impl Into<String>,
        nick_name: impl Into<String>,
        auth: impl Into<String>,
        group_name: Option<String>,
        message: Value,
    ) -> Self {
        Self::Message {
            token: token.into(),
            nick_name: nick_name.into(),
            auth: auth.into(),
            group_name,
            message,
        }
    }
}

/// A successful login reply.
///
/// `raw` keeps the full server payload so subscribers receive it untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginAck {
    pub auth: Option<String>,
    pub group_name: Option<String>,
    pub raw: Value,
}

/// An inbound server envelope, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPayload {
    /// `{"type":"login","result":true,...}` — login accepted.
    LoginAck(LoginAck),
    /// Any envelope with `"result": false` — the server has unilaterally
    /// closed the logical session.
    Rejection(Value),
    /// Anything else — an application broadcast, passed through verbatim.
    Broadcast(Value),
}

/// Classify one inbound message into a [`ServerPayload`].
///
/// Rejection requires an explicit `"result": false`; an envelope with no
/// `result` field at all is a broadcast.
pub fn classify(text: &str) -> Result<ServerPayload, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    let kind = value.get("type").and_then(Value::as_str);
    let result = value.get("result").and_then(Value::as_bool);

    if kind == Some("login") && result == Some(true) {
        let auth = value
            .get("auth")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let group_name = value
            .get("groupName")
            .and_then(Value::as_str)
            .map(str::to_owned);
        return Ok(ServerPayload::LoginAck(LoginAck {
            auth,
            group_name,
            raw: value,
        }));
    }

    if result == Some(false) {
        return Ok(ServerPayload::Rejection(value));
    }

    Ok(ServerPayload::Broadcast(value))
}
