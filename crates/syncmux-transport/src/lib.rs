//! The text-frame connection abstraction the hub (server) and client
//! multiplexer are built against. Nothing in this crate knows about
//! WebSockets specifically — `syncmux-ws` supplies the one concrete
//! `RawDuplex` this repo ships, and tests use [`mock::channel_pair`]
//! instead.

pub mod mock;

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The one capability a concrete transport must provide: send a text frame,
/// receive the next one, in either order, exclusively owned by whichever
/// task is pumping this connection.
#[async_trait]
pub trait RawDuplex: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// `Ok(None)` means the peer closed the connection cleanly.
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError>;
}

/// A frame arriving from a connection's pump task.
#[derive(Debug)]
pub enum InboundEvent {
    Frame(ConnectionId, String),
    Closed(ConnectionId),
}

/// A handle to a running connection: send frames to it without touching the
/// underlying duplex, which stays owned by the pump task.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }
}

/// Spawn a task that owns `duplex` exclusively: frames given to the
/// returned [`Connection`] are written out, and frames read off the wire are
/// forwarded to `inbound` tagged with `id`. The task exits (and sends
/// `InboundEvent::Closed`) when either side closes or errors.
pub fn spawn_pump(
    id: ConnectionId,
    mut duplex: Box<dyn RawDuplex>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
) -> Connection {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                sent = outbound_rx.recv() => {
                    match sent {
                        Some(text) => {
                            if duplex.send_text(text).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                received = duplex.recv_text() => {
                    match received {
                        Ok(Some(text)) => {
                            if inbound.send(InboundEvent::Frame(id, text)).is_err() {
                                break;
                            }
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
            }
        }
        let _ = inbound.send(InboundEvent::Closed(id));
    });

    Connection { id, outbound: outbound_tx }
}
