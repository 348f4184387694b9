use crate::error::StreamError;

/// Normalize a user-supplied ticker: trim and uppercase.
pub fn normalize_symbol(raw: &str) -> Result<String, StreamError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(StreamError::InvalidSymbol(raw.to_string()));
    }
    Ok(symbol)
}
