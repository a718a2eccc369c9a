//! Groupcast client — a login-gated session wrapper around one WebSocket
//! connection.
//!
//! A [`SessionClient`] owns a single transport at a time, drives it through
//! the login handshake, and surfaces everything that happens to it through
//! subscription events:
//!
//! - `login` — the server accepted the login; the session is live
//! - `broadcast` — a server-originated message, passed through verbatim
//! - `requesterror` — the server rejected a request and closed the session
//! - `close` — the transport closed
//! - `error` — the transport failed
//!
//! # Usage
//!
//! ```rust,no_run
//! use groupcast_client::{EventKind, SessionEvent, WsSessionClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WsSessionClient::websocket("ws://127.0.0.1:8888", "helloworld");
//!
//! client.on(EventKind::Broadcast, |event: &SessionEvent| {
//!     if let SessionEvent::Broadcast(payload) = event {
//!         println!("<< {payload}");
//!     }
//! });
//!
//! client.connect(Some("alice"), Some("lobby"))?;
//! # Ok(())
//! # }
//! ```
//!
//! Reconnection is always caller-initiated: any terminal event (`close`,
//! `error`, `requesterror`) leaves the session idle until `connect` is
//! called again.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod channel;
pub mod session;
pub mod transport;

pub use channel::{EventChannel, ListenerId};
pub use session::{
    ConnectionState, EventKind, SessionClient, SessionError, SessionEvent, WsSessionClient,
};
pub use transport::{
    CloseFrame, Connector, EventSink, Transport, TransportError, TransportEvent, TransportStatus,
    WsConnector, WsTransport,
};

// A panicking listener must not poison internal state for everyone else.
pub(crate) fn relock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
