//! Quote feed wire messages and the inbound normalizer
//!
//! The feed tags every message with a `type` field. Only `stockQuote` carries
//! data we care about; everything else (acks, echoes of our own subscribe
//! messages, future message kinds) is ignored without affecting the
//! connection.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical live quote delivered to stream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub symbol: String,
    pub price: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl QuoteUpdate {
    /// Quote time as a UTC datetime, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Nested payload of a `stockQuote` message
#[derive(Debug, Clone, Deserialize)]
pub struct QuotePayload {
    pub price: f64,
    pub timestamp: i64,
}

/// Inbound messages from the quote feed.
///
/// Unknown `type` values deserialize to `Other` so they can be counted and
/// dropped instead of treated as parse failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "stockQuote")]
    StockQuote { symbol: String, data: QuotePayload },
    #[serde(other)]
    Other,
}

/// Subscription request sent once after every successful open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionIntent {
    pub symbol: String,
    pub interval_ms: u32,
}

/// Outbound control messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "subscribe")]
    Subscribe(SubscriptionIntent),
}

impl SubscriptionIntent {
    pub fn new(symbol: impl Into<String>, interval_ms: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval_ms,
        }
    }

    /// Encode as `{"type":"subscribe","symbol":"AAPL","intervalMs":1000}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&OutboundMessage::Subscribe(self.clone()))
    }
}

/// Why an inbound frame produced no update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not JSON, no `type` field, or a `stockQuote` with a broken payload
    Malformed,
    /// A recognized envelope of a kind other than `stockQuote`
    OtherKind,
    /// A `stockQuote` whose values violate the quote invariants
    InvalidQuote,
    /// Older than the last quote delivered for the symbol on this connection
    OutOfOrder,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::Malformed => "malformed",
            IgnoreReason::OtherKind => "other_kind",
            IgnoreReason::InvalidQuote => "invalid_quote",
            IgnoreReason::OutOfOrder => "out_of_order",
        }
    }
}

/// Result of normalizing one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Quote(QuoteUpdate),
    Ignored(IgnoreReason),
}

/// Convert a raw text frame into at most one [`QuoteUpdate`].
pub fn normalize(raw: &str) -> Normalized {
    let msg = match serde_json::from_str::<InboundMessage>(raw) {
        Ok(msg) => msg,
        Err(_) => return Normalized::Ignored(IgnoreReason::Malformed),
    };

    match msg {
        InboundMessage::StockQuote { symbol, data } => {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() || !data.price.is_finite() || data.price <= 0.0 {
                return Normalized::Ignored(IgnoreReason::InvalidQuote);
            }
            Normalized::Quote(QuoteUpdate {
                symbol,
                price: data.price,
                timestamp: data.timestamp,
            })
        }
        InboundMessage::Other => Normalized::Ignored(IgnoreReason::OtherKind),
    }
}
