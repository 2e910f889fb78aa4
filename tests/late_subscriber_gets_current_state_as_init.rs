//! A client that subscribes after many updates have already landed gets
//! the current state as its init, not a replay of history, and the next
//! broadcast continues the version sequence from there.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncmux::{ClientConfig, ClientMux, DuplexFactory, Hub, HubConfig, RawDuplex, SharedObjectClient, SharedObjectEvent, SharedObjectServer, TransportError};
use syncmux_transport::mock::{channel_pair, ChannelDuplex};

struct OnceFactory(Mutex<Option<ChannelDuplex>>);

#[async_trait::async_trait]
impl DuplexFactory for OnceFactory {
    async fn connect(&self) -> Result<Box<dyn RawDuplex>, TransportError> {
        self.0
            .lock()
            .unwrap()
            .take()
            .map(|d| Box::new(d) as Box<dyn RawDuplex>)
            .ok_or(TransportError::Closed)
    }
}

async fn connected_client(hub: &Arc<Hub>) -> Arc<ClientMux> {
    let (server_duplex, client_duplex) = channel_pair();
    hub.accept(Box::new(server_duplex));
    let factory = Arc::new(OnceFactory(Mutex::new(Some(client_duplex))));
    let mux = ClientMux::new(factory, ClientConfig::default());
    tokio::time::sleep(Duration::from_millis(20)).await;
    mux
}

#[tokio::test]
async fn late_subscriber_gets_current_state_as_init() {
    let schema = json!({"type": "object", "properties": {"count": {"type": "number"}}});
    let hub = Hub::new("hash".to_owned(), HubConfig::default());
    let server = SharedObjectServer::new("counter", hub.clone(), schema, false, json!({"count": 0})).unwrap();

    for n in 1..=100u64 {
        server.set(&vec!["count".into()], json!(n)).unwrap();
        server.notify(Some(&vec!["count".into()])).unwrap();
    }
    assert_eq!(server.version(), 100);

    let mux = connected_client(&hub).await;
    let client = SharedObjectClient::new("counter", mux, Duration::from_secs(3));
    let (v, data) = client.subscribe().await.unwrap();
    assert_eq!(v, 100, "the init reflects current state, not a history replay");
    assert_eq!(data["count"], 100);

    let mut events = client.events();
    server.set(&vec!["count".into()], json!(101)).unwrap();
    server.notify(Some(&vec!["count".into()])).unwrap();

    let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, SharedObjectEvent::Update));
    assert_eq!(client.version(), 101, "version sequence continues past the late subscriber's init");
    assert_eq!(client.data().unwrap()["count"], 101);
}
