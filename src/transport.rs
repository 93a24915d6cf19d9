//! Thin adapter around the `tokio-tungstenite` framing client.
//!
//! [`connect`] performs the handshake and spawns a single I/O task owning
//! both halves of the stream. Everything the remote side does is surfaced as
//! [`TransportEvent`]s on one mpsc channel, so the supervisor consumes them
//! on a single serialised context. Outbound frames travel the other way over
//! an unbounded channel and never block the caller.

use std::sync::Arc;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::Result;
use crate::error::TransportError;

/// Header carrying the unique client identifier.
pub const IDENTIFIER_HEADER: &str = "identifier";
/// Header carrying the opaque last-connected-at token.
pub const LAST_CONNECTED_AT_HEADER: &str = "last-connected-at";

/// Capacity of the event channel between the I/O task and the supervisor.
const EVENT_CAPACITY: usize = 256;

/// Transport lifecycle and traffic notifications, delivered in order on a
/// single channel per connection.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// The handshake completed and the transport is usable
    Open,
    /// A text frame arrived
    Message(String),
    /// The connection closed, remotely or locally
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// An unrecoverable transport error
    Error(crate::error::Error),
}

/// Handle onto a live connection: non-blocking send plus idempotent close.
#[derive(Debug, Clone)]
pub(crate) struct TransportHandle {
    outbound_tx: mpsc::UnboundedSender<String>,
    close: Arc<Notify>,
}

impl TransportHandle {
    /// Queue a text frame for transmission.
    ///
    /// Fails once the I/O task has terminated.
    pub(crate) fn send(&self, frame: String) -> Result<()> {
        self.outbound_tx
            .send(frame)
            .map_err(|_| TransportError::Closed.into())
    }

    /// Ask the I/O task to perform a close handshake and exit.
    pub(crate) fn close(&self) {
        self.close.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn disconnected_for_tests() -> Self {
        let (outbound_tx, _) = mpsc::unbounded_channel();
        Self {
            outbound_tx,
            close: Arc::new(Notify::new()),
        }
    }
}

/// Open a connection, attaching the session identity headers.
///
/// The whole attempt, handshake included, is bounded by `connect_timeout`;
/// on expiry the half-open connection is dropped. The returned receiver
/// yields [`TransportEvent::Open`] first, then traffic and closure events.
pub(crate) async fn connect(
    url: &str,
    identifier: &str,
    last_connected_at: &str,
    connect_timeout: std::time::Duration,
) -> Result<(TransportHandle, mpsc::Receiver<TransportEvent>)> {
    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(IDENTIFIER_HEADER, HeaderValue::from_str(identifier)?);
    headers.insert(
        LAST_CONNECTED_AT_HEADER,
        HeaderValue::from_str(last_connected_at)?,
    );

    let (stream, _response) = tokio::time::timeout(connect_timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            after: connect_timeout,
        })??;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let close = Arc::new(Notify::new());

    let handle = TransportHandle {
        outbound_tx,
        close: Arc::clone(&close),
    };

    let _ = events_tx.send(TransportEvent::Open).await;
    tokio::spawn(io_task(stream, outbound_rx, events_tx, close));

    Ok((handle, events_rx))
}

async fn io_task(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::Sender<TransportEvent>,
    close: Arc<Notify>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            () = close.notified() => {
                // Best-effort close handshake; the peer may already be gone.
                let _ = write.send(Message::Close(None)).await;
                let _ = events_tx
                    .send(TransportEvent::Closed { code: None, reason: None })
                    .await;
                break;
            }

            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    let _ = events_tx.send(TransportEvent::Error(e.into())).await;
                    break;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events_tx
                            .send(TransportEvent::Message(text.to_string()))
                            .await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            let _ = events_tx.send(TransportEvent::Error(e.into())).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((None, None), |f| {
                            (Some(u16::from(f.code)), Some(f.reason.to_string()))
                        });
                        let _ = events_tx.send(TransportEvent::Closed { code, reason }).await;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames and unsolicited pongs are ignored.
                    }
                    Some(Err(e)) => {
                        let _ = events_tx.send(TransportEvent::Error(e.into())).await;
                        break;
                    }
                    None => {
                        let _ = events_tx
                            .send(TransportEvent::Closed { code: None, reason: None })
                            .await;
                        break;
                    }
                }
            }
        }
    }
}
