//! A ready client that receives an update skipping a version treats the
//! gap as divergence: it disconnects, re-subscribes, and re-syncs from a
//! fresh init rather than trying to repair the missing delta.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncmux::{ClientConfig, ClientMux, DuplexFactory, RawDuplex, SharedObjectClient, SharedObjectEvent, TransportError};
use syncmux_transport::mock::{channel_pair, ChannelDuplex};
use syncmux_wire::frame::ServerFrame;

struct QueuedFactory {
    duplexes: Mutex<Vec<ChannelDuplex>>,
}

#[async_trait::async_trait]
impl DuplexFactory for QueuedFactory {
    async fn connect(&self) -> Result<Box<dyn RawDuplex>, TransportError> {
        let mut queue = self.duplexes.lock().unwrap();
        if queue.is_empty() {
            return Err(TransportError::Closed);
        }
        Ok(Box::new(queue.remove(0)))
    }
}

#[tokio::test]
async fn version_gap_recovery() {
    let (client_side, mut server_side) = channel_pair();
    let factory = Arc::new(QueuedFactory { duplexes: Mutex::new(vec![client_side]) });
    let mux = ClientMux::new(factory, ClientConfig::default());
    let client = SharedObjectClient::new("board", mux, Duration::from_secs(3));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let client2 = client.clone();
    let subscribe = tokio::spawn(async move { client2.subscribe().await });
    let _ = server_side.recv_text().await;
    let init = ServerFrame::Init { endpoint: "board".to_owned(), data: json!({"value": 0}), v: 5 };
    server_side.send_text(serde_json::to_string(&init).unwrap()).await.unwrap();
    let (v, _) = subscribe.await.unwrap().unwrap();
    assert_eq!(v, 5);

    // v=6 arrives in sequence and is applied normally.
    let mut events = client.events();
    let update6 = ServerFrame::Update {
        endpoint: "board".to_owned(),
        delta: vec![syncmux_wire::delta::DeltaEntry::Replace { path: vec!["value".into()], value: json!(1) }],
        v: 6,
        now: chrono::Utc::now().to_rfc3339(),
    };
    server_side.send_text(serde_json::to_string(&update6).unwrap()).await.unwrap();
    let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, SharedObjectEvent::Update));
    assert_eq!(client.version(), 6);
    assert_eq!(client.data().unwrap()["value"], 1);

    // v=8 arrives, skipping v=7: the client must treat this as divergence.
    let update8 = ServerFrame::Update { endpoint: "board".to_owned(), delta: vec![], v: 8, now: chrono::Utc::now().to_rfc3339() };
    server_side.send_text(serde_json::to_string(&update8).unwrap()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, SharedObjectEvent::Disconnected));
    assert!(!client.ready());

    // Re-subscribe is observed on the wire, then a fresh init completes recovery.
    let resub = server_side.recv_text().await.unwrap().unwrap();
    assert!(resub.contains("\"sub\""));

    let fresh_init = ServerFrame::Init { endpoint: "board".to_owned(), data: json!({"value": 99}), v: 12 };
    server_side.send_text(serde_json::to_string(&fresh_init).unwrap()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, SharedObjectEvent::Init));
    assert_eq!(client.version(), 12);
    assert_eq!(client.data().unwrap()["value"], 99);
}
