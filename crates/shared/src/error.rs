//! Protocol error types.

use thiserror::Error;

/// Failure to interpret an inbound server payload.
///
/// The transport contract guarantees one JSON envelope per message, so these
/// only occur when the peer violates the protocol. The session logs and drops
/// such payloads rather than killing the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
    /// The payload parsed, but an envelope must be a JSON object.
    #[error("envelope is not a JSON object")]
    NotAnObject,
}
