//! Overlay of live quotes onto a previously loaded stock snapshot

use serde::{Deserialize, Serialize};

use crate::messages::QuoteUpdate;

/// The price-bearing subset of a stock detail snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSnapshot {
    pub symbol: String,
    pub price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub day_low: f64,
    pub day_high: f64,
    /// Milliseconds since the Unix epoch
    pub updated_at: i64,
}

impl StockSnapshot {
    /// Apply a live quote. Returns false, leaving the snapshot untouched,
    /// when the quote is for another symbol.
    pub fn apply_quote(&mut self, quote: &QuoteUpdate) -> bool {
        if !self.symbol.eq_ignore_ascii_case(&quote.symbol) {
            return false;
        }

        self.price = quote.price;
        self.change = quote.price - self.previous_close;
        self.change_percent = if self.previous_close > 0.0 {
            self.change / self.previous_close * 100.0
        } else {
            0.0
        };
        self.day_low = self.day_low.min(quote.price);
        self.day_high = self.day_high.max(quote.price);
        self.updated_at = quote.timestamp;
        true
    }
}
