//! Prometheus metrics for the quote stream client

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

use crate::status::ConnectionStatus;

const LABEL_SYMBOL: &str = "symbol";
const LABEL_REASON: &str = "reason";

/// Quotes delivered to consumers
static QUOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "quotefeed_quotes_total",
        "Total quote updates delivered to stream consumers",
        &[LABEL_SYMBOL]
    )
    .expect("Failed to register quotes_total metric")
});

/// Inbound frames that produced no update
static MESSAGES_IGNORED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "quotefeed_messages_ignored_total",
        "Total inbound messages filtered by the normalizer",
        &[LABEL_SYMBOL, LABEL_REASON]
    )
    .expect("Failed to register messages_ignored_total metric")
});

/// Scheduled reconnects by cause (error, clean_close)
static RECONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "quotefeed_reconnects_total",
        "Total reconnects scheduled by the reconnection policy",
        &[LABEL_SYMBOL, LABEL_REASON]
    )
    .expect("Failed to register reconnects_total metric")
});

/// 0=disconnected, 1=connected, 2=reconnecting, 3=error
static CONNECTION_STATUS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "quotefeed_connection_status",
        "Quote feed connection status (0=disconnected, 1=connected, 2=reconnecting, 3=error)"
    )
    .expect("Failed to register connection_status metric")
});

/// Handle for recording metrics for one streamed symbol
#[derive(Clone)]
pub struct FeedMetrics {
    symbol: String,
}

impl FeedMetrics {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn inc_quote(&self) {
        QUOTES_TOTAL.with_label_values(&[&self.symbol]).inc();
    }

    pub fn inc_ignored(&self, reason: &str) {
        MESSAGES_IGNORED_TOTAL
            .with_label_values(&[&self.symbol, reason])
            .inc();
    }

    pub fn inc_reconnect(&self, reason: &str) {
        RECONNECTS_TOTAL
            .with_label_values(&[&self.symbol, reason])
            .inc();
    }

    pub fn quotes(&self) -> u64 {
        QUOTES_TOTAL.with_label_values(&[&self.symbol]).get()
    }
}

pub fn set_connection_status(status: ConnectionStatus) {
    CONNECTION_STATUS.set(status.as_gauge());
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}
