//! The server-side multiplexer: one text-frame connection per client,
//! framed sub/unsub/rpc, per-endpoint subscriber fanout, and the
//! init-before-broadcast ordering a `SharedObjectServer` depends on.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use syncmux_transport::{spawn_pump, Connection, ConnectionId, InboundEvent, RawDuplex};
use syncmux_wire::frame::{ClientFrame, ServerFrame};
use syncmux_wire::{SyncMuxError, DESCRIPTOR_ENDPOINT, FLUSH_ENDPOINT};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Registered by a `SharedObjectServer` so the hub can hand a fresh client
/// its init frame before adding it to the broadcast set.
pub trait InitHandler: Send + Sync {
    fn init_frame(&self) -> (Value, u64);
}

#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, SyncMuxError>;
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub heartbeat_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { heartbeat_ms: 5_000 }
    }
}

pub struct Hub {
    descriptor_hash: String,
    config: HubConfig,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    subscribers: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    init_handlers: RwLock<HashMap<String, Arc<dyn InitHandler>>>,
    rpc_handlers: RwLock<HashMap<String, Arc<dyn RpcHandler>>>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
}

impl Hub {
    pub fn new(descriptor_hash: String, config: HubConfig) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            descriptor_hash,
            config,
            connections: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            init_handlers: RwLock::new(HashMap::new()),
            rpc_handlers: RwLock::new(HashMap::new()),
            inbound_tx,
        });
        let dispatcher = hub.clone();
        tokio::spawn(async move { dispatcher.dispatch_loop(inbound_rx).await });
        let heartbeat_hub = hub.clone();
        tokio::spawn(async move { heartbeat_hub.heartbeat_loop().await });
        hub
    }

    /// Hand over a freshly-accepted duplex (e.g. an upgraded WebSocket) and
    /// start pumping it. Returns the connection's id.
    pub fn accept(self: &Arc<Self>, duplex: Box<dyn RawDuplex>) -> ConnectionId {
        let id = ConnectionId::next();
        let conn = spawn_pump(id, duplex, self.inbound_tx.clone());
        self.connections.write().unwrap().insert(id, conn);
        debug!(%id, "connection accepted");
        id
    }

    pub fn register_init_handler(&self, endpoint: &str, handler: Arc<dyn InitHandler>) {
        self.init_handlers
            .write()
            .unwrap()
            .insert(endpoint.to_owned(), handler);
    }

    pub fn register_rpc_handler(&self, endpoint: &str, handler: Arc<dyn RpcHandler>) {
        self.rpc_handlers
            .write()
            .unwrap()
            .insert(endpoint.to_owned(), handler);
    }

    /// Send `frame` to every connection currently subscribed to `endpoint`.
    pub fn broadcast(&self, endpoint: &str, frame: &ServerFrame) {
        let Ok(json) = serde_json::to_string(frame) else {
            warn!(endpoint, "failed to serialize frame for broadcast");
            return;
        };
        let subscribers = self.subscribers.read().unwrap();
        let Some(ids) = subscribers.get(endpoint) else {
            return;
        };
        let connections = self.connections.read().unwrap();
        for id in ids {
            if let Some(conn) = connections.get(id) {
                let _ = conn.send(json.clone());
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut inbound_rx: mpsc::UnboundedReceiver<InboundEvent>) {
        while let Some(event) = inbound_rx.recv().await {
            match event {
                InboundEvent::Frame(id, text) => self.clone().handle_frame(id, text).await,
                InboundEvent::Closed(id) => self.handle_disconnect(id),
            }
        }
    }

    /// Malformed JSON from a client is a fatal protocol error — we and the
    /// client have lost frame sync, so the connection is closed outright
    /// and the client's own reconnect logic restores service. A frame that
    /// parses as JSON but names an unrecognized `type` is just ignored.
    async fn handle_frame(self: Arc<Self>, id: ConnectionId, text: String) {
        let raw: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(%id, error = %e, "malformed JSON from client, closing connection");
                self.close(id);
                return;
            }
        };
        let frame: ClientFrame = match serde_json::from_value(raw) {
            Ok(f) => f,
            Err(e) => {
                debug!(%id, error = %e, "unrecognized client frame, ignoring");
                return;
            }
        };
        match frame {
            ClientFrame::Sub { endpoint } => self.handle_sub(id, &endpoint),
            ClientFrame::Unsub { endpoint } => self.handle_unsub(id, &endpoint),
            ClientFrame::RpcReq { id: req_id, endpoint, input } => {
                self.handle_rpc(id, req_id, endpoint, input).await;
            }
        }
    }

    fn handle_sub(self: &Arc<Self>, id: ConnectionId, endpoint: &str) {
        if endpoint == DESCRIPTOR_ENDPOINT {
            self.send_to(id, &ServerFrame::RpcRes {
                id: String::new(),
                endpoint: endpoint.to_owned(),
                err: None,
                res: Some(Value::String(self.descriptor_hash.clone())),
            });
            return;
        }
        if let Some(handler) = self.init_handlers.read().unwrap().get(endpoint).cloned() {
            let (data, v) = handler.init_frame();
            self.send_to(id, &ServerFrame::Init { endpoint: endpoint.to_owned(), data, v });
        }
        self.subscribers
            .write()
            .unwrap()
            .entry(endpoint.to_owned())
            .or_default()
            .insert(id);
    }

    fn handle_unsub(&self, id: ConnectionId, endpoint: &str) {
        if let Some(set) = self.subscribers.write().unwrap().get_mut(endpoint) {
            set.remove(&id);
        }
    }

    async fn handle_rpc(self: Arc<Self>, id: ConnectionId, req_id: String, endpoint: String, input: Value) {
        if endpoint == DESCRIPTOR_ENDPOINT {
            self.send_to(id, &ServerFrame::RpcRes {
                id: req_id,
                endpoint,
                err: None,
                res: Some(Value::String(self.descriptor_hash.clone())),
            });
            return;
        }
        if endpoint == FLUSH_ENDPOINT {
            self.send_to(id, &ServerFrame::RpcRes {
                id: req_id,
                endpoint,
                err: None,
                res: Some(Value::Null),
            });
            return;
        }
        let handler = self.rpc_handlers.read().unwrap().get(&endpoint).cloned();
        let frame = match handler {
            Some(handler) => match handler.call(input).await {
                Ok(res) => ServerFrame::RpcRes { id: req_id, endpoint, err: None, res: Some(res) },
                Err(e) => ServerFrame::RpcRes { id: req_id, endpoint, err: Some(e.to_wire()), res: None },
            },
            None => ServerFrame::RpcRes {
                id: req_id,
                endpoint: endpoint.clone(),
                err: Some(SyncMuxError::UnknownEndpoint(endpoint).to_wire()),
                res: None,
            },
        };
        self.send_to(id, &frame);
    }

    fn handle_disconnect(&self, id: ConnectionId) {
        self.connections.write().unwrap().remove(&id);
        for set in self.subscribers.write().unwrap().values_mut() {
            set.remove(&id);
        }
        debug!(%id, "connection closed");
    }

    /// Force a connection closed from this side. Dropping its last
    /// `Connection` handle (held only here, in `connections`) closes the
    /// pump task's outbound channel, which the pump treats the same as the
    /// peer hanging up: the task exits and the duplex is dropped.
    fn close(&self, id: ConnectionId) {
        self.handle_disconnect(id);
    }

    fn send_to(&self, id: ConnectionId, frame: &ServerFrame) {
        let Ok(json) = serde_json::to_string(frame) else { return };
        if let Some(conn) = self.connections.read().unwrap().get(&id) {
            let _ = conn.send(json);
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.heartbeat_ms));
        interval.tick().await;
        loop {
            interval.tick().await;
            let frame = ServerFrame::Heartbeat { frequency_ms: self.config.heartbeat_ms };
            let Ok(json) = serde_json::to_string(&frame) else { continue };
            let connections = self.connections.read().unwrap();
            for conn in connections.values() {
                let _ = conn.send(json.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmux_transport::mock::channel_pair;

    #[tokio::test]
    async fn malformed_json_closes_the_connection() {
        let hub = Hub::new("hash".to_owned(), HubConfig::default());
        let (server_side, mut client_side) = channel_pair();
        hub.accept(Box::new(server_side));

        client_side.send_text("not valid json".to_owned()).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_millis(200), client_side.recv_text())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, None, "the hub must close the connection on malformed JSON");
    }

    #[tokio::test]
    async fn unrecognized_frame_type_is_ignored_not_fatal() {
        let hub = Hub::new("hash".to_owned(), HubConfig::default());
        let (server_side, mut client_side) = channel_pair();
        hub.accept(Box::new(server_side));

        client_side.send_text(r#"{"type":"frobnicate","endpoint":"x"}"#.to_owned()).await.unwrap();

        let descriptor_req = ClientFrame::RpcReq {
            id: "1".to_owned(),
            endpoint: DESCRIPTOR_ENDPOINT.to_owned(),
            input: Value::Null,
        };
        client_side.send_text(serde_json::to_string(&descriptor_req).unwrap()).await.unwrap();
        let reply = tokio::time::timeout(std::time::Duration::from_millis(200), client_side.recv_text())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.is_some(), "the connection must still respond after an unrecognized frame type");
    }
}
