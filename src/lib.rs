//! syncmux: schema-validated messaging over one multiplexed connection.
//!
//! Four endpoint kinds — RPC, PubSub, PushPull, and SharedObject — share a
//! single persistent text-frame connection between a server and many
//! clients, declared up front in a descriptor so both sides agree on names,
//! kinds, and JSON-Schemas before any data moves.
//!
//! This crate re-exports the pieces most callers need: [`Hub`] and
//! [`SharedObjectServer`] on the server side, [`ClientMux`] and
//! [`SharedObjectClient`] on the client side. `syncmux-ws` supplies a
//! working `RawDuplex` over real WebSockets; swap it for anything else by
//! implementing `syncmux_transport::RawDuplex`.

pub use syncmux_client::{ClientConfig, ClientEvent, ClientMux, DuplexFactory, EndpointHandler, SharedObjectClient, SharedObjectEvent};
pub use syncmux_core::{CoreError, ReadOnlyView};
pub use syncmux_server::{Hub, HubConfig, InitHandler, RpcHandler, SharedObjectServer};
pub use syncmux_transport::{Connection, ConnectionId, InboundEvent, RawDuplex, TransportError};
pub use syncmux_wire::{
    Descriptor, DuplicateEndpointName, EndpointDescriptor, EndpointKind, Path, PathSegment,
    SyncMuxError, DESCRIPTOR_ENDPOINT, FLUSH_ENDPOINT,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use syncmux_transport::mock::channel_pair;

    #[tokio::test]
    async fn a_subscribing_client_receives_init_before_any_update() {
        let hub = Hub::new("test-hash".to_owned(), HubConfig::default());
        let schema = json!({"type": "object", "properties": {"value": {"type": "number"}}});
        let server = SharedObjectServer::new("board", hub.clone(), schema, false, json!({"value": 0})).unwrap();

        let (server_duplex, client_duplex) = channel_pair();
        hub.accept(Box::new(server_duplex));

        struct QueuedFactory {
            duplex: std::sync::Mutex<Option<syncmux_transport::mock::ChannelDuplex>>,
        }
        #[async_trait::async_trait]
        impl DuplexFactory for QueuedFactory {
            async fn connect(&self) -> Result<Box<dyn RawDuplex>, TransportError> {
                self.duplex
                    .lock()
                    .unwrap()
                    .take()
                    .map(|d| Box::new(d) as Box<dyn RawDuplex>)
                    .ok_or(TransportError::Closed)
            }
        }
        let factory = Arc::new(QueuedFactory { duplex: std::sync::Mutex::new(Some(client_duplex)) });
        let mux = ClientMux::new(factory, ClientConfig::default());
        let client_board = SharedObjectClient::new("board", mux, Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (v, data) = client_board.subscribe().await.unwrap();
        assert_eq!(v, 0);
        assert_eq!(data["value"], 0);

        server.set(&vec!["value".into()], json!(42)).unwrap();
        server.notify(None).unwrap();

        let mut events = client_board.events();
        let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SharedObjectEvent::Update));
        assert_eq!(client_board.data().unwrap()["value"], 42);
        assert_eq!(client_board.version(), 1);
    }
}
