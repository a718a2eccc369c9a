//! Login-gated session state machine over a single transport.
//!
//! A [`SessionClient`] owns one transport connection at a time, drives it
//! through the login handshake, and re-emits transport and protocol events
//! through an [`EventChannel`]. All transitions happen on transport-event
//! dispatch or direct caller invocation, serialized through the session
//! lock; notifications are emitted after the lock is released so listeners
//! may re-enter the public API.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use groupcast_shared::{classify, ClientRequest, ServerPayload};

use crate::channel::{EventChannel, ListenerId};
use crate::relock;
use crate::transport::{
    CloseFrame, Connector, EventSink, Transport, TransportError, TransportEvent, WsConnector,
};

/// Session lifecycle state.
///
/// `Authenticated` holds exactly when the auth token is set; teardown always
/// returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Authenticated,
}

/// Notification kinds a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Login,
    Broadcast,
    RequestError,
    Close,
    Error,
}

/// Notifications dispatched to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Login confirmed; carries the full server payload.
    Login(Value),
    /// Server-originated broadcast, passed through verbatim.
    Broadcast(Value),
    /// The server rejected a request and closed the logical session.
    RequestError(Value),
    /// The transport closed, with the peer's close frame when any.
    Close(Option<CloseFrame>),
    /// The transport failed; teardown follows.
    Error(TransportError),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Login(_) => EventKind::Login,
            Self::Broadcast(_) => EventKind::Broadcast,
            Self::RequestError(_) => EventKind::RequestError,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Synchronous usage errors. Transport-level failures never surface here;
/// they arrive as [`EventKind::Error`] / [`EventKind::Close`] notifications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `connect` was called without a nickname ever being supplied.
    #[error("no identity set; supply a nickname at construction or to connect()")]
    MissingIdentity,
    /// `connect` was re-entered while a teardown was in progress.
    #[error("session teardown in progress")]
    TeardownInProgress,
    /// The configured endpoint is not a ws:// or wss:// URL.
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
}

struct Inner<C: Connector> {
    endpoint: String,
    credential: String,
    identity: Option<String>,
    group: Option<String>,
    auth_token: Option<String>,
    state: ConnectionState,
    tearing_down: bool,
    /// Bumped on every teardown; events from transports attached under an
    /// older generation are discarded.
    generation: u64,
    connector: C,
    transport: Option<C::Transport>,
}

impl<C: Connector> Inner<C> {
    /// Serialize and send one request over the live transport.
    fn send_request(&mut self, request: &ClientRequest) -> bool {
        let text = match serde_json::to_string(request) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("failed to serialize request: {e}");
                return false;
            }
        };
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.send(&text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("send failed: {e}");
                false
            }
        }
    }

    fn handle_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let request = ClientRequest::login(identity, self.credential.clone(), self.group.clone());
        self.send_request(&request);
    }

    fn handle_message(&mut self, text: &str) -> Option<SessionEvent> {
        match classify(text) {
            Ok(ServerPayload::LoginAck(ack)) => {
                self.auth_token = Some(ack.auth.clone().unwrap_or_default());
                self.group = ack.group_name.clone();
                self.state = ConnectionState::Authenticated;
                tracing::info!(
                    "logged in to {} as {:?}",
                    self.endpoint,
                    self.identity.as_deref().unwrap_or_default()
                );
                Some(SessionEvent::Login(ack.raw))
            }
            Ok(ServerPayload::Rejection(payload)) => {
                tracing::info!("server rejected the session");
                self.terminate();
                Some(SessionEvent::RequestError(payload))
            }
            Ok(ServerPayload::Broadcast(payload)) => Some(SessionEvent::Broadcast(payload)),
            Err(e) => {
                tracing::warn!("dropping malformed server payload: {e}");
                None
            }
        }
    }

    /// Unconditional cleanup: detach the sink, close and release the
    /// transport, reset to `Idle`. Guarded against re-entry.
    fn terminate(&mut self) {
        if self.tearing_down {
            return;
        }
        self.tearing_down = true;
        self.generation += 1;
        if let Some(mut transport) = self.transport.take() {
            transport.detach();
            transport.close();
        }
        self.state = ConnectionState::Idle;
        self.auth_token = None;
        self.tearing_down = false;
    }
}

/// Client-side session over one WebSocket-style transport.
///
/// Cheap to clone; clones share the same session and listener registry.
pub struct SessionClient<C: Connector> {
    inner: Arc<Mutex<Inner<C>>>,
    events: EventChannel<EventKind, SessionEvent>,
}

impl<C: Connector> Clone for SessionClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
        }
    }
}

/// The session client over the bundled tokio-tungstenite transport.
pub type WsSessionClient = SessionClient<WsConnector>;

impl SessionClient<WsConnector> {
    /// Session client over [`crate::transport::WsTransport`]. `connect` must
    /// then be called from within a tokio runtime.
    pub fn websocket(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::new(endpoint, credential, WsConnector)
    }
}

impl<C: Connector + 'static> SessionClient<C> {
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>, connector: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                endpoint: endpoint.into(),
                credential: credential.into(),
                identity: None,
                group: None,
                auth_token: None,
                state: ConnectionState::Idle,
                tearing_down: false,
                generation: 0,
                connector,
                transport: None,
            })),
            events: EventChannel::new(),
        }
    }

    /// Set the nickname used at login.
    pub fn with_identity(self, identity: impl Into<String>) -> Self {
        relock(&self.inner).identity = Some(identity.into());
        self
    }

    /// Set the group joined at login.
    pub fn with_group(self, group: impl Into<String>) -> Self {
        relock(&self.inner).group = Some(group.into());
        self
    }

    /// Dial the endpoint and start the login handshake.
    ///
    /// An existing connection is fully torn down first, so `connect` is also
    /// the way to abort an in-flight handshake or force a reconnect. The
    /// nickname and group may be refreshed here; empty strings count as not
    /// supplied. Fails fast when no nickname was ever supplied — transport
    /// failures never surface here, only through notifications.
    pub fn connect(&self, identity: Option<&str>, group: Option<&str>) -> Result<(), SessionError> {
        let mut guard = relock(&self.inner);
        if guard.tearing_down {
            return Err(SessionError::TeardownInProgress);
        }
        if let Some(status) = guard.transport.as_ref().map(Transport::status) {
            tracing::debug!("superseding existing transport ({status:?})");
            guard.terminate();
        }
        if let Some(identity) = identity.filter(|s| !s.is_empty()) {
            guard.identity = Some(identity.to_owned());
        }
        if let Some(group) = group.filter(|s| !s.is_empty()) {
            guard.group = Some(group.to_owned());
        }
        if guard.identity.is_none() {
            return Err(SessionError::MissingIdentity);
        }

        let endpoint = guard.endpoint.clone();
        let url =
            Url::parse(&endpoint).map_err(|_| SessionError::InvalidEndpoint(endpoint.clone()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SessionError::InvalidEndpoint(endpoint));
        }

        tracing::debug!("connecting to {endpoint}");
        let mut transport = guard.connector.open(&endpoint);
        transport.attach(self.sink(guard.generation));
        guard.transport = Some(transport);
        guard.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Send a message to the session's group.
    ///
    /// Only sends while authenticated; returns whether the send occurred.
    pub fn broadcast<M: Serialize>(&self, message: M) -> bool {
        let mut guard = relock(&self.inner);
        if guard.state != ConnectionState::Authenticated {
            return false;
        }
        let (Some(identity), Some(auth)) = (guard.identity.clone(), guard.auth_token.clone())
        else {
            return false;
        };
        let body = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("broadcast body failed to serialize: {e}");
                return false;
            }
        };
        let request = ClientRequest::message(
            guard.credential.clone(),
            identity,
            auth,
            guard.group.clone(),
            body,
        );
        guard.send_request(&request)
    }

    /// Close an authenticated session. A no-op otherwise; no notification is
    /// emitted for a locally initiated close.
    pub fn close(&self) {
        let mut guard = relock(&self.inner);
        if guard.state == ConnectionState::Authenticated {
            guard.terminate();
        }
    }

    /// Register a persistent listener for `kind`.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> ListenerId {
        self.events.on(kind, callback)
    }

    /// Register a listener for `kind` invoked at most once.
    pub fn once(
        &self,
        kind: EventKind,
        callback: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> ListenerId {
        self.events.once(kind, callback)
    }

    /// Remove one listener registration.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) {
        self.events.remove_listener(&kind, id);
    }

    /// Remove every listener for `kind`.
    pub fn remove_all_listeners(&self, kind: EventKind) {
        self.events.remove_all_listeners(&kind);
    }

    pub fn state(&self) -> ConnectionState {
        relock(&self.inner).state
    }

    /// Server-issued credential; set exactly while authenticated.
    pub fn auth_token(&self) -> Option<String> {
        relock(&self.inner).auth_token.clone()
    }

    pub fn identity(&self) -> Option<String> {
        relock(&self.inner).identity.clone()
    }

    pub fn group(&self) -> Option<String> {
        relock(&self.inner).group.clone()
    }

    pub fn endpoint(&self) -> String {
        relock(&self.inner).endpoint.clone()
    }

    /// Sink for a transport attached under `generation`. Holds only a weak
    /// session reference so a dropped client does not leak its transport
    /// callbacks.
    fn sink(&self, generation: u64) -> EventSink {
        let inner = Arc::downgrade(&self.inner);
        let events = self.events.clone();
        Arc::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                dispatch(&inner, &events, generation, event);
            }
        })
    }
}

/// Apply one transport event to the session.
///
/// State work happens under the session lock; notifications are emitted
/// after it is released. Events from a superseded transport generation are
/// discarded.
fn dispatch<C: Connector>(
    inner: &Arc<Mutex<Inner<C>>>,
    events: &EventChannel<EventKind, SessionEvent>,
    generation: u64,
    event: TransportEvent,
) {
    match event {
        TransportEvent::Open => {
            let mut guard = relock(inner);
            if guard.generation != generation {
                return;
            }
            guard.handle_open();
        }
        TransportEvent::Message(text) => {
            let note = {
                let mut guard = relock(inner);
                if guard.generation != generation {
                    return;
                }
                guard.handle_message(&text)
            };
            if let Some(note) = note {
                events.emit(&note.kind(), &note);
            }
        }
        TransportEvent::Closed(frame) => {
            let note = {
                let mut guard = relock(inner);
                if guard.generation != generation {
                    return;
                }
                guard.terminate();
                SessionEvent::Close(frame)
            };
            events.emit(&EventKind::Close, &note);
        }
        TransportEvent::Error(error) => {
            {
                let guard = relock(inner);
                if guard.generation != generation || guard.tearing_down {
                    return;
                }
            }
            // Notify first, then tear down — unless a listener already
            // replaced or closed the session.
            events.emit(&EventKind::Error, &SessionEvent::Error(error));
            let mut guard = relock(inner);
            if guard.generation == generation {
                guard.terminate();
            }
        }
    }
}
