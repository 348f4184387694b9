use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

/// Opens transport sessions to the quote feed (WebSocket in production,
/// scripted in tests).
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    /// Open a new session. Each call is one outbound connection attempt.
    async fn open(&self, url: &Url) -> Result<Box<dyn QuoteSession>, TransportError>;
}

/// One open, bidirectional message session.
///
/// Dropping a session releases the underlying connection without waiting for
/// a close handshake.
#[async_trait]
pub trait QuoteSession: Send {
    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// `Ok(None)` means the server closed the session cleanly; any transport
    /// fault is an `Err`. Control frames are handled internally.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close gracefully, best effort
    async fn close(&mut self);
}
