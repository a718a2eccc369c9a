//! Native WebSocket transport over tokio-tungstenite.

use std::sync::{Arc, Mutex};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{
    CloseFrame, Connector, EventSink, Transport, TransportError, TransportEvent, TransportStatus,
};
use crate::relock;

/// State shared between the transport handle and its driver task.
struct Shared {
    status: Mutex<TransportStatus>,
    sink: Mutex<Option<EventSink>>,
}

impl Shared {
    fn set_status(&self, status: TransportStatus) {
        *relock(&self.status) = status;
    }

    /// Deliver one event to the attached sink, if any. The sink lock is
    /// released before the callback runs so a listener may detach or close
    /// the transport without deadlocking.
    fn deliver(&self, event: TransportEvent) {
        let sink = relock(&self.sink).clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

/// A WebSocket connection driven by a background tokio task.
///
/// [`WsTransport::open`] must be called from within a tokio runtime. The
/// driver task owns the socket: outbound messages travel through an
/// unbounded channel, inbound frames are pumped into the attached sink one
/// at a time, in delivery order.
pub struct WsTransport {
    shared: Arc<Shared>,
    outgoing: UnboundedSender<Message>,
}

impl WsTransport {
    pub fn open(url: &str) -> Self {
        let (outgoing, rx) = unbounded();
        let shared = Arc::new(Shared {
            status: Mutex::new(TransportStatus::Connecting),
            sink: Mutex::new(None),
        });
        tokio::spawn(drive(url.to_owned(), Arc::clone(&shared), rx));
        Self { shared, outgoing }
    }
}

impl Transport for WsTransport {
    fn attach(&mut self, sink: EventSink) {
        *relock(&self.shared.sink) = Some(sink);
    }

    fn detach(&mut self) {
        *relock(&self.shared.sink) = None;
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.status() != TransportStatus::Open {
            return Err(TransportError::NotConnected);
        }
        self.outgoing
            .unbounded_send(Message::text(text))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        {
            let mut status = relock(&self.shared.status);
            if *status == TransportStatus::Closed {
                return;
            }
            *status = TransportStatus::Closing;
        }
        let _ = self.outgoing.unbounded_send(Message::Close(None));
    }

    fn status(&self) -> TransportStatus {
        *relock(&self.shared.status)
    }
}

async fn drive(url: String, shared: Arc<Shared>, mut outgoing: UnboundedReceiver<Message>) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::warn!("websocket connect to {url} failed: {e}");
            shared.set_status(TransportStatus::Closed);
            shared.deliver(TransportEvent::Error(TransportError::Socket(e.to_string())));
            shared.deliver(TransportEvent::Closed(None));
            return;
        }
    };
    tracing::debug!("websocket connected to {url}");
    shared.set_status(TransportStatus::Open);
    shared.deliver(TransportEvent::Open);

    let (mut write, mut read) = socket.split();
    let mut close_frame: Option<CloseFrame> = None;

    loop {
        tokio::select! {
            outbound = outgoing.next() => match outbound {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        tracing::warn!("websocket send to {url} failed: {e}");
                        shared.deliver(TransportEvent::Error(TransportError::Socket(
                            e.to_string(),
                        )));
                        break;
                    }
                }
                None => {
                    // Handle dropped; best-effort orderly close.
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    shared.deliver(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    close_frame = frame.map(|f| CloseFrame {
                        code: f.code.into(),
                        reason: f.reason.to_string(),
                    });
                    break;
                }
                // Ping/pong are answered by tungstenite; binary is ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("websocket read from {url} failed: {e}");
                    shared.deliver(TransportEvent::Error(TransportError::Socket(
                        e.to_string(),
                    )));
                    break;
                }
                None => break,
            },
        }
    }

    tracing::debug!("websocket to {url} closed");
    shared.set_status(TransportStatus::Closed);
    shared.deliver(TransportEvent::Closed(close_frame));
}

/// [`Connector`] producing [`WsTransport`] connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn open(&mut self, endpoint: &str) -> WsTransport {
        WsTransport::open(endpoint)
    }
}
