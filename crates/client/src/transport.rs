//! Transport abstraction over a message-oriented socket.
//!
//! The session owns exactly one transport at a time and consumes it through
//! four lifecycle events delivered to an attached sink, two operations
//! (`send`, `close`), and a status probe. The production implementation is
//! [`WsTransport`] over tokio-tungstenite; tests substitute scripted
//! in-memory transports through the same traits.

use std::sync::Arc;

use thiserror::Error;

mod ws;

pub use ws::{WsConnector, WsTransport};

/// Socket readiness, as reported by the status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Close information supplied by the peer, when any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// Transport-level failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The socket is not open for sending.
    #[error("transport is not connected")]
    NotConnected,
    /// The underlying socket reported a failure.
    #[error("socket failure: {0}")]
    Socket(String),
}

/// A lifecycle event delivered to the attached sink.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection completed and the socket is open.
    Open,
    /// One inbound text message, containing a single JSON envelope.
    Message(String),
    /// The socket failed. A `Closed` event follows when the socket dies.
    Error(TransportError),
    /// The socket closed, with the peer's close frame when one was received.
    Closed(Option<CloseFrame>),
}

/// Receiver for transport lifecycle events.
pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// One live socket connection.
///
/// Contract: after [`Transport::detach`] returns, no further events are
/// delivered to the previously attached sink, and [`Transport::close`] never
/// invokes the sink synchronously. The session relies on both to guarantee
/// that teardown cannot re-enter its own notification path.
pub trait Transport: Send + 'static {
    /// Attach the lifecycle event sink. At most one sink is attached at a
    /// time; attaching replaces any previous sink.
    fn attach(&mut self, sink: EventSink);

    /// Detach the current sink, if any.
    fn detach(&mut self);

    /// Queue one outbound text message.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Request an orderly close. Safe to call in any state.
    fn close(&mut self);

    /// Current socket readiness.
    fn status(&self) -> TransportStatus;
}

/// Opens transports. Each call yields a brand-new connection; the session
/// never reuses a transport across reconnects.
///
/// Opening never fails synchronously — connection failures surface as
/// `Error`/`Closed` events on the attached sink, mirroring the socket
/// semantics the wire protocol was designed against.
pub trait Connector: Send {
    type Transport: Transport;

    fn open(&mut self, endpoint: &str) -> Self::Transport;
}
