//! WebSocket transport for the quote feed
//!
//! Thin wrapper over tokio-tungstenite. Ping frames are answered here; pong
//! and binary frames are skipped. A close frame or end of stream counts as a
//! clean close, everything else as a transport error.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::TransportError;
use crate::traits::{QuoteSession, QuoteTransport};

/// Production transport
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Max WebSocket message size: 1 MiB (quote frames are tiny)
    const MAX_MESSAGE_SIZE: usize = 1_048_576;

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuoteTransport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn QuoteSession>, TransportError> {
        info!(url = %url, "Connecting to quote feed WebSocket");

        let config = WebSocketConfig {
            max_message_size: Some(Self::MAX_MESSAGE_SIZE),
            max_frame_size: Some(Self::MAX_MESSAGE_SIZE),
            ..Default::default()
        };

        let (ws, response) = connect_async_with_config(url.as_str(), Some(config), true).await?;

        info!(status = ?response.status(), "Quote feed WebSocket connected");

        Ok(Box::new(WsSession { ws }))
    }
}

/// An open WebSocket session
pub struct WsSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl QuoteSession for WsSession {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        trace!(msg = %text, "Sending quote feed message");
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Received quote feed message");
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received WS ping, sending pong");
                    self.ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Quote feed WebSocket closed by server");
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "Error closing quote feed WebSocket");
        }
    }
}
