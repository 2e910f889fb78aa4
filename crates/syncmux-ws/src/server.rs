//! Server-side `RawDuplex`: an axum `WebSocket` after `ws.on_upgrade`.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use syncmux_transport::{RawDuplex, TransportError};

pub struct AxumDuplex {
    socket: WebSocket,
}

impl AxumDuplex {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl RawDuplex for AxumDuplex {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.socket.recv().await {
                None => return Ok(None),
                Some(Ok(Message::Text(t))) => return Ok(Some(t.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.socket.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}
