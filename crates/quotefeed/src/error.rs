use std::time::Duration;
use thiserror::Error;

/// Failures of a single transport connection. These never reach callers of
/// the stream directly; they feed the reconnection policy.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Read timeout after {0:?}")]
    ReadTimeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors surfaced to consumers of a quote stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("reconnection attempts exhausted after {attempts} consecutive failures: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
