//! An in-memory duplex pair, the test double `rt-test-utils`' mock
//! WebSocket client/server play for the forwarder/server/receiver suite —
//! here there is no socket at all, just two channels.

use crate::{RawDuplex, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub struct ChannelDuplex {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl RawDuplex for ChannelDuplex {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Build a connected pair: frames sent on one side arrive on the other.
pub fn channel_pair() -> (ChannelDuplex, ChannelDuplex) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        ChannelDuplex { tx: a_tx, rx: b_rx },
        ChannelDuplex { tx: b_tx, rx: a_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_sent_on_one_side_arrive_on_the_other() {
        let (mut client, mut server) = channel_pair();
        client.send_text("hello".to_owned()).await.unwrap();
        assert_eq!(server.recv_text().await.unwrap(), Some("hello".to_owned()));
    }

    #[tokio::test]
    async fn dropping_one_side_closes_the_other() {
        let (client, mut server) = channel_pair();
        drop(client);
        assert_eq!(server.recv_text().await.unwrap(), None);
    }
}
