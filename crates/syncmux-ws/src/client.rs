//! Client-side `RawDuplex`: a `tokio-tungstenite` connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use syncmux_transport::{RawDuplex, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TungsteniteDuplex {
    ws: WsStream,
}

impl TungsteniteDuplex {
    /// Connect to `url`, which must already carry any auth the server
    /// expects (query string, or build the request yourself and use
    /// [`TungsteniteDuplex::connect_with_request`]).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Self::connect_with_request(request).await
    }

    pub async fn connect_with_request(
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
    ) -> Result<Self, TransportError> {
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { ws })
    }
}

#[async_trait]
impl RawDuplex for TungsteniteDuplex {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.ws.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(t))) => return Ok(Some(t.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.ws.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}
