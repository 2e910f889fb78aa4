//! The client-side multiplexer: one reconnecting connection, resubscribe on
//! every reconnect, RPC correlation by id, and heartbeat-timeout detection.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use syncmux_transport::{spawn_pump, Connection, ConnectionId, InboundEvent, RawDuplex, TransportError};
use syncmux_wire::delta::Delta;
use syncmux_wire::frame::{ClientFrame, ServerFrame};
use syncmux_wire::{SyncMuxError, DESCRIPTOR_ENDPOINT, FLUSH_ENDPOINT};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Produces a fresh [`RawDuplex`] on every (re)connect attempt.
#[async_trait]
pub trait DuplexFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RawDuplex>, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Multiple of the server-announced heartbeat interval tolerated before
    /// declaring a heartbeat timeout.
    pub heartbeat_timeout_factor: u32,
    pub rpc_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_factor: 3,
            rpc_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(200),
            reconnect_max_delay: Duration::from_secs(10),
        }
    }
}

/// Receives frames routed by endpoint name. `SharedObjectClient` implements
/// `on_init`/`on_update`; a PubSub/PushPull subscriber implements
/// `on_message`. Defaults are no-ops so each implementer only overrides
/// what its endpoint kind uses.
pub trait EndpointHandler: Send + Sync {
    fn on_init(&self, _data: Value, _v: u64) {}
    fn on_update(&self, _delta: Delta, _v: u64, _now: String) {}
    fn on_message(&self, _message: Value) {}
    fn on_disconnected(&self) {}
}

struct PendingRpc {
    reply: oneshot::Sender<Result<Value, SyncMuxError>>,
}

struct MuxState {
    connection: Option<Connection>,
    subscribed: HashSet<String>,
    handlers: HashMap<String, Arc<dyn EndpointHandler>>,
    pending_rpc: HashMap<String, PendingRpc>,
    frequency_ms: Option<u64>,
    last_message_at: Option<Instant>,
}

pub struct ClientMux {
    factory: Arc<dyn DuplexFactory>,
    config: ClientConfig,
    state: Mutex<MuxState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientMux {
    pub fn new(factory: Arc<dyn DuplexFactory>, config: ClientConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        let mux = Arc::new(Self {
            factory,
            config,
            state: Mutex::new(MuxState {
                connection: None,
                subscribed: HashSet::new(),
                handlers: HashMap::new(),
                pending_rpc: HashMap::new(),
                frequency_ms: None,
                last_message_at: None,
            }),
            events,
        });
        let supervisor = mux.clone();
        tokio::spawn(async move { supervisor.run().await });
        mux
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connected(&self) -> bool {
        self.state.lock().unwrap().connection.is_some()
    }

    pub fn register_handler(&self, endpoint: &str, handler: Arc<dyn EndpointHandler>) {
        self.state
            .lock()
            .unwrap()
            .handlers
            .insert(endpoint.to_owned(), handler);
    }

    /// Mark `endpoint` as subscribed and send `sub` immediately if
    /// connected. Duplicate calls are cheap and, per the wire protocol,
    /// re-send `sub` to force a fresh init.
    pub fn subscribe(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        state.subscribed.insert(endpoint.to_owned());
        if let Some(conn) = &state.connection {
            send_frame(conn, &ClientFrame::Sub { endpoint: endpoint.to_owned() });
        }
    }

    pub fn unsubscribe(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        state.subscribed.remove(endpoint);
        if let Some(conn) = &state.connection {
            send_frame(conn, &ClientFrame::Unsub { endpoint: endpoint.to_owned() });
        }
    }

    pub async fn call(&self, endpoint: &str, input: Value) -> Result<Value, SyncMuxError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap();
            let Some(conn) = state.connection.clone() else {
                return Err(SyncMuxError::ConnectionFailed {
                    message: "not connected".to_owned(),
                });
            };
            state.pending_rpc.insert(id.clone(), PendingRpc { reply: tx });
            send_frame(&conn, &ClientFrame::RpcReq { id: id.clone(), endpoint: endpoint.to_owned(), input });
        }
        match tokio::time::timeout(self.config.rpc_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SyncMuxError::ConnectionFailed {
                message: "connection closed while awaiting rpc response".to_owned(),
            }),
            Err(_) => {
                self.state.lock().unwrap().pending_rpc.remove(&id);
                Err(SyncMuxError::Timeout { what: format!("rpc {endpoint}") })
            }
        }
    }

    /// Fetch the server's descriptor hash via the reserved RPC endpoint.
    pub async fn descriptor_hash(&self) -> Result<String, SyncMuxError> {
        let res = self.call(DESCRIPTOR_ENDPOINT, Value::Null).await?;
        res.as_str().map(str::to_owned).ok_or_else(|| SyncMuxError::ValidationFailed {
            endpoint: Some(DESCRIPTOR_ENDPOINT.to_owned()),
            message: "descriptor response was not a string".to_owned(),
        })
    }

    /// Fetch the server's descriptor hash and compare it against `local`'s,
    /// raising [`SyncMuxError::DescriptorMismatch`] if they differ. Call
    /// this once after connecting, before subscribing to anything, so a
    /// stale client fails loudly instead of misinterpreting frames shaped
    /// by a descriptor it never agreed to.
    pub async fn verify_descriptor(&self, local: &syncmux_wire::Descriptor) -> Result<(), SyncMuxError> {
        let server = self.descriptor_hash().await?;
        let local = local.hash();
        if local != server {
            return Err(SyncMuxError::DescriptorMismatch { local, server });
        }
        Ok(())
    }

    /// A barrier confirming the server has processed every `sub`/`unsub`
    /// sent before this call.
    pub async fn flush(&self) -> Result<(), SyncMuxError> {
        self.call(FLUSH_ENDPOINT, Value::Null).await.map(|_| ())
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            let duplex = match self.factory.connect().await {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, attempt, "connect failed, retrying");
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
            };
            attempt = 0;

            let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
            let id = ConnectionId::next();
            let conn = spawn_pump(id, duplex, inbound_tx);
            {
                let mut state = self.state.lock().unwrap();
                state.connection = Some(conn.clone());
                state.frequency_ms = None;
                state.last_message_at = Some(Instant::now());
            }
            for endpoint in self.subscribed_snapshot() {
                send_frame(&conn, &ClientFrame::Sub { endpoint });
            }
            let _ = self.events.send(ClientEvent::Connected);
            debug!(%id, "client connected");

            let mut heartbeat_check = tokio::time::interval(Duration::from_millis(500));
            heartbeat_check.tick().await;
            loop {
                tokio::select! {
                    event = inbound_rx.recv() => {
                        match event {
                            Some(InboundEvent::Frame(_, text)) => {
                                if !self.handle_frame(&text) {
                                    break;
                                }
                            }
                            Some(InboundEvent::Closed(_)) | None => break,
                        }
                    }
                    _ = heartbeat_check.tick() => {
                        if self.heartbeat_timed_out() {
                            warn!("heartbeat timeout, reconnecting");
                            break;
                        }
                    }
                }
            }

            self.teardown_connection();
            let _ = self.events.send(ClientEvent::Disconnected);
        }
    }

    fn subscribed_snapshot(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribed.iter().cloned().collect()
    }

    fn teardown_connection(&self) {
        let mut state = self.state.lock().unwrap();
        state.connection = None;
        state.frequency_ms = None;
        let handlers: Vec<Arc<dyn EndpointHandler>> = state.handlers.values().cloned().collect();
        let failed: Vec<PendingRpc> = state.pending_rpc.drain().map(|(_, v)| v).collect();
        drop(state);
        for pending in failed {
            let _ = pending.reply.send(Err(SyncMuxError::ConnectionFailed {
                message: "connection closed".to_owned(),
            }));
        }
        for handler in handlers {
            handler.on_disconnected();
        }
    }

    fn heartbeat_timed_out(&self) -> bool {
        let state = self.state.lock().unwrap();
        let (Some(frequency_ms), Some(last)) = (state.frequency_ms, state.last_message_at) else {
            return false;
        };
        let bound = Duration::from_millis(frequency_ms * u64::from(self.config.heartbeat_timeout_factor));
        last.elapsed() > bound
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay.as_millis() as u64;
        let max = self.config.reconnect_max_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(max);
        let jitter = rand::thread_rng().gen_range(0..=capped / 2 + 1);
        Duration::from_millis(capped / 2 + jitter)
    }

    /// Returns `false` if the connection must be torn down: malformed JSON
    /// is a fatal protocol error (the peer and we have lost frame sync), so
    /// the caller breaks the connection loop and reconnects. A frame that
    /// parses as JSON but names an unrecognized `type` is just ignored —
    /// forward compatibility, not corruption.
    fn handle_frame(&self, text: &str) -> bool {
        let raw: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "malformed JSON from server, closing connection");
                return false;
            }
        };
        let frame: ServerFrame = match serde_json::from_value(raw) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "unrecognized server frame, ignoring");
                return true;
            }
        };
        {
            let mut state = self.state.lock().unwrap();
            state.last_message_at = Some(Instant::now());
            if let ServerFrame::Heartbeat { frequency_ms } = &frame {
                state.frequency_ms = Some(*frequency_ms);
            }
        }
        match frame {
            ServerFrame::Heartbeat { .. } => {}
            ServerFrame::RpcRes { id, err, res, .. } => {
                let pending = self.state.lock().unwrap().pending_rpc.remove(&id);
                if let Some(pending) = pending {
                    let result = match err {
                        Some(wire) => Err(SyncMuxError::from_wire(&wire)),
                        None => Ok(res.unwrap_or(Value::Null)),
                    };
                    let _ = pending.reply.send(result);
                }
            }
            ServerFrame::Init { endpoint, data, v } => {
                if let Some(handler) = self.state.lock().unwrap().handlers.get(&endpoint).cloned() {
                    handler.on_init(data, v);
                }
            }
            ServerFrame::Update { endpoint, delta, v, now } => {
                if let Some(handler) = self.state.lock().unwrap().handlers.get(&endpoint).cloned() {
                    handler.on_update(delta, v, now);
                }
            }
            ServerFrame::EndpointMessage { endpoint, message } => {
                if let Some(handler) = self.state.lock().unwrap().handlers.get(&endpoint).cloned() {
                    handler.on_message(message);
                }
            }
        }
        true
    }
}

fn send_frame(conn: &Connection, frame: &ClientFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = conn.send(json);
        }
        Err(e) => warn!(error = %e, "failed to serialize outgoing frame"),
    }
}
