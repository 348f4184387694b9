//! Connection status published by the stream client

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::metrics;

/// Health of the quote feed transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Initial state, or after an explicit teardown
    #[default]
    Disconnected,
    /// Transport open
    Connected,
    /// A retry is scheduled
    Reconnecting,
    /// Retry budget exhausted; terminal until the next stream request
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }

    /// Numeric encoding for the status gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connected => 1,
            ConnectionStatus::Reconnecting => 2,
            ConnectionStatus::Error => 3,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write handle held by one stream task.
///
/// Writes are dropped once the task's token is cancelled. The check runs
/// under the watch lock, so a superseded task can never overwrite the status
/// written by the teardown that cancelled it.
#[derive(Clone)]
pub(crate) struct StatusWriter {
    tx: Arc<watch::Sender<ConnectionStatus>>,
    cancel: CancellationToken,
}

impl StatusWriter {
    pub(crate) fn new(tx: Arc<watch::Sender<ConnectionStatus>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Returns true if the status changed.
    pub(crate) fn set(&self, status: ConnectionStatus) -> bool {
        let cancel = &self.cancel;
        let changed = self.tx.send_if_modified(|current| {
            if cancel.is_cancelled() || *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            metrics::set_connection_status(status);
        }
        changed
    }
}

/// Unconditional write used by the owner of the status channel.
pub(crate) fn force_status(tx: &watch::Sender<ConnectionStatus>, status: ConnectionStatus) -> bool {
    let changed = tx.send_if_modified(|current| {
        if *current == status {
            return false;
        }
        *current = status;
        true
    });
    if changed {
        metrics::set_connection_status(status);
    }
    changed
}
