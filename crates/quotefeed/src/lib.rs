//! quotefeed: auto-reconnecting real-time stock quote stream client
//!
//! This crate connects to a market-data API's quote WebSocket, subscribes to
//! one symbol at a time, filters and normalizes inbound messages, and fans the
//! resulting quotes out to any number of observers while tracking connection
//! health.

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod messages;
pub mod metrics;
pub mod policy;
pub mod server;
pub mod snapshot;
pub mod status;
pub mod symbol;
pub mod traits;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use client::QuoteStreamClient;
pub use config::StreamConfig;
pub use error::{ConfigError, StreamError, TransportError};
pub use feed::{QuoteStream, QuoteSubscription};
pub use messages::{normalize, IgnoreReason, Normalized, QuoteUpdate, SubscriptionIntent};
pub use policy::{Disconnect, ReconnectConfig, ReconnectPolicy, RetryDecision};
pub use server::{create_router, run_server, ServerState};
pub use snapshot::StockSnapshot;
pub use status::ConnectionStatus;
pub use symbol::normalize_symbol;
pub use traits::{QuoteSession, QuoteTransport};
pub use websocket::WsTransport;
