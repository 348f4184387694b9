//! Quote stream client
//!
//! Owns at most one live feed connection. Each stream request tears down the
//! previous stream and spawns a task that opens the transport, sends the
//! subscription, normalizes inbound frames, and reopens per the
//! [`ReconnectPolicy`] until it is cancelled or gives up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::StreamConfig;
use crate::error::{ConfigError, StreamError, TransportError};
use crate::feed::{FeedEnd, FeedHub, QuoteStream};
use crate::messages::{normalize, IgnoreReason, Normalized, QuoteUpdate, SubscriptionIntent};
use crate::metrics::FeedMetrics;
use crate::policy::{Disconnect, ReconnectPolicy, RetryDecision};
use crate::status::{force_status, ConnectionStatus, StatusWriter};
use crate::traits::{QuoteSession, QuoteTransport};
use crate::websocket::WsTransport;

/// Bound on the close handshake after a read timeout
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct ActiveStream {
    symbol: String,
    cancel: CancellationToken,
    hub: Arc<FeedHub>,
    task: JoinHandle<()>,
}

/// Connection manager for a single real-time quote stream.
///
/// Must be used from within a tokio runtime.
pub struct QuoteStreamClient {
    config: Arc<StreamConfig>,
    url: Url,
    transport: Arc<dyn QuoteTransport>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    active: Mutex<Option<ActiveStream>>,
}

impl QuoteStreamClient {
    /// Client over the WebSocket transport
    pub fn new(config: StreamConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, Arc::new(WsTransport::new()))
    }

    pub fn with_transport(
        config: StreamConfig,
        transport: Arc<dyn QuoteTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.ws_url()?;
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Ok(Self {
            config: Arc::new(config),
            url,
            transport,
            status_tx: Arc::new(status_tx),
            active: Mutex::new(None),
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start streaming quotes for `symbol`, replacing any current stream.
    ///
    /// The returned handle can be subscribed to any number of times. The
    /// previous stream's observers see the end of their stream, and its
    /// connection is closed before the new one opens.
    pub fn stream(&self, symbol: &str) -> Result<QuoteStream, StreamError> {
        if symbol.trim().is_empty() {
            return Err(StreamError::InvalidSymbol(symbol.to_string()));
        }
        let symbol = symbol.trim().to_string();

        let mut active = self.active();
        let prior = teardown(&mut active);
        force_status(&self.status_tx, ConnectionStatus::Disconnected);

        let cancel = CancellationToken::new();
        let hub = FeedHub::new(symbol.clone(), self.config.channel_capacity);
        let task = FeedTask {
            symbol: symbol.clone(),
            url: self.url.clone(),
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            hub: Arc::clone(&hub),
            status: StatusWriter::new(Arc::clone(&self.status_tx), cancel.clone()),
            metrics: FeedMetrics::new(symbol.clone()),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run(prior));

        info!(symbol = %symbol, url = %self.url, "Quote stream requested");
        *active = Some(ActiveStream {
            symbol,
            cancel,
            hub: Arc::clone(&hub),
            task: handle,
        });

        Ok(QuoteStream::new(hub))
    }

    /// Tear down the current stream, cancel any scheduled retry, and reset
    /// the status to disconnected. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut active = self.active();
        if teardown(&mut active).is_some() {
            info!("Quote stream disconnected");
        }
        force_status(&self.status_tx, ConnectionStatus::Disconnected);
    }

    /// Observe connection status changes
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Symbol of the current stream, if one was requested and not torn down
    pub fn active_symbol(&self) -> Option<String> {
        self.active().as_ref().map(|a| a.symbol.clone())
    }
}

impl Drop for QuoteStreamClient {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        teardown(active);
    }
}

/// Cancel and end the active stream. Returns its task so a successor can
/// wait for the old connection to be released.
fn teardown(active: &mut Option<ActiveStream>) -> Option<JoinHandle<()>> {
    let prev = active.take()?;
    prev.cancel.cancel();
    prev.hub.finish(FeedEnd::Disconnected);
    debug!(symbol = %prev.symbol, "Quote stream torn down");
    Some(prev.task)
}

/// Producer for one stream: the only owner of its transport session.
struct FeedTask {
    symbol: String,
    url: Url,
    config: Arc<StreamConfig>,
    transport: Arc<dyn QuoteTransport>,
    hub: Arc<FeedHub>,
    status: StatusWriter,
    metrics: FeedMetrics,
    cancel: CancellationToken,
}

impl FeedTask {
    async fn run(self, prior: Option<JoinHandle<()>>) {
        let cancel = self.cancel.clone();
        select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(symbol = %self.symbol, "Quote stream task cancelled");
            }
            _ = self.drive(prior) => {}
        }
    }

    async fn drive(&self, prior: Option<JoinHandle<()>>) {
        if let Some(prior) = prior {
            // The superseded task drops its session on exit
            let _ = prior.await;
        }

        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        loop {
            let reason = self.run_connection(&mut policy).await;

            match policy.on_disconnect(&reason) {
                RetryDecision::Backoff { attempt, delay } => {
                    warn!(
                        symbol = %self.symbol,
                        attempt,
                        max_attempts = policy.config().max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = ?reason,
                        "Quote feed connection failed, reconnecting"
                    );
                    self.metrics.inc_reconnect("error");
                    self.status.set(ConnectionStatus::Reconnecting);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Resume { delay } => {
                    info!(
                        symbol = %self.symbol,
                        delay_ms = delay.as_millis() as u64,
                        "Quote feed closed by server, reopening"
                    );
                    self.metrics.inc_reconnect("clean_close");
                    self.status.set(ConnectionStatus::Reconnecting);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { attempts } => {
                    let last_error = match reason {
                        Disconnect::Failed(e) => e,
                        Disconnect::ClosedCleanly => "connection closed".to_string(),
                    };
                    error!(
                        symbol = %self.symbol,
                        attempts,
                        error = %last_error,
                        "Quote feed reconnection attempts exhausted"
                    );
                    self.status.set(ConnectionStatus::Error);
                    self.hub.finish(FeedEnd::Failed(StreamError::RetriesExhausted {
                        attempts,
                        last_error,
                    }));
                    return;
                }
            }
        }
    }

    /// One connection epoch: open, subscribe, read until the session ends.
    async fn run_connection(&self, policy: &mut ReconnectPolicy) -> Disconnect {
        debug!(symbol = %self.symbol, url = %self.url, "Opening quote feed connection");
        let opened =
            tokio::time::timeout(self.config.connect_timeout, self.transport.open(&self.url)).await;
        let mut session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Disconnect::Failed(e.to_string()),
            Err(_) => {
                return Disconnect::Failed(
                    TransportError::ConnectTimeout(self.config.connect_timeout).to_string(),
                )
            }
        };

        policy.reset();
        self.status.set(ConnectionStatus::Connected);
        info!(symbol = %self.symbol, "Quote feed connected");

        if let Err(e) = self.subscribe(session.as_mut()).await {
            return Disconnect::Failed(e.to_string());
        }

        // Timestamps are only comparable within one connection
        let mut last_seen: HashMap<String, i64> = HashMap::new();
        loop {
            let frame =
                match tokio::time::timeout(self.config.read_timeout, session.recv()).await {
                    Ok(frame) => frame,
                    Err(_) => {
                        warn!(
                            symbol = %self.symbol,
                            timeout_secs = self.config.read_timeout.as_secs(),
                            "Quote feed read timeout"
                        );
                        let _ = tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await;
                        return Disconnect::Failed(
                            TransportError::ReadTimeout(self.config.read_timeout).to_string(),
                        );
                    }
                };

            match frame {
                Ok(Some(text)) => self.handle_frame(&text, &mut last_seen),
                Ok(None) => return Disconnect::ClosedCleanly,
                Err(e) => {
                    debug!(symbol = %self.symbol, error = %e, "Quote feed transport error");
                    return Disconnect::Failed(e.to_string());
                }
            }
        }
    }

    async fn subscribe(&self, session: &mut dyn QuoteSession) -> Result<(), TransportError> {
        let intent = SubscriptionIntent::new(self.symbol.clone(), self.config.subscribe_interval_ms);
        session.send_text(intent.to_json()?).await?;
        debug!(
            symbol = %self.symbol,
            interval_ms = self.config.subscribe_interval_ms,
            "Subscription sent"
        );
        Ok(())
    }

    fn handle_frame(&self, text: &str, last_seen: &mut HashMap<String, i64>) {
        let quote = match normalize(text) {
            Normalized::Quote(quote) => quote,
            Normalized::Ignored(reason) => {
                self.ignore(reason);
                return;
            }
        };

        if is_stale(&quote, last_seen) {
            debug!(
                symbol = %quote.symbol,
                timestamp = quote.timestamp,
                "Dropping out-of-order quote"
            );
            self.metrics.inc_ignored(IgnoreReason::OutOfOrder.as_str());
            return;
        }

        trace!(symbol = %quote.symbol, price = quote.price, "Quote received");
        if self.hub.publish(quote) {
            self.metrics.inc_quote();
        }
    }

    fn ignore(&self, reason: IgnoreReason) {
        trace!(symbol = %self.symbol, reason = reason.as_str(), "Inbound message ignored");
        self.metrics.inc_ignored(reason.as_str());
    }
}

/// True if `quote` is older than the last accepted quote for its symbol;
/// otherwise records its timestamp.
fn is_stale(quote: &QuoteUpdate, last_seen: &mut HashMap<String, i64>) -> bool {
    match last_seen.get_mut(&quote.symbol) {
        Some(prev) if quote.timestamp < *prev => true,
        Some(prev) => {
            *prev = quote.timestamp;
            false
        }
        None => {
            last_seen.insert(quote.symbol.clone(), quote.timestamp);
            false
        }
    }
}
