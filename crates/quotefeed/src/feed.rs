//! Fan-out of one stream's quotes to any number of observers
//!
//! A broadcast channel carries live events; a single-slot cache holds the
//! latest quote (and the terminal event, once there is one) so observers that
//! attach late are replayed the current value first. Publishing and
//! subscribing both happen under the cache lock, which keeps the replay and
//! the live channel free of gaps and duplicates.

use futures_util::Stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::StreamError;
use crate::messages::QuoteUpdate;

#[derive(Debug, Clone)]
pub(crate) enum FeedEvent {
    Quote(QuoteUpdate),
    End(FeedEnd),
}

/// How a stream ended
#[derive(Debug, Clone)]
pub(crate) enum FeedEnd {
    /// Explicit disconnect or superseded by a newer stream
    Disconnected,
    /// Retry budget exhausted
    Failed(StreamError),
}

#[derive(Default)]
struct Replay {
    latest: Option<QuoteUpdate>,
    end: Option<FeedEnd>,
}

pub(crate) struct FeedHub {
    symbol: String,
    replay: Mutex<Replay>,
    tx: broadcast::Sender<FeedEvent>,
}

impl FeedHub {
    pub(crate) fn new(symbol: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            symbol: symbol.into(),
            replay: Mutex::new(Replay::default()),
            tx,
        })
    }

    fn replay(&self) -> MutexGuard<'_, Replay> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a quote. Returns false once the stream has ended.
    pub(crate) fn publish(&self, quote: QuoteUpdate) -> bool {
        let mut replay = self.replay();
        if replay.end.is_some() {
            return false;
        }
        replay.latest = Some(quote.clone());
        // No receivers is fine; the cache still serves late observers
        let _ = self.tx.send(FeedEvent::Quote(quote));
        true
    }

    /// End the stream. The first call wins; later calls return false.
    pub(crate) fn finish(&self, end: FeedEnd) -> bool {
        let mut replay = self.replay();
        if replay.end.is_some() {
            return false;
        }
        replay.end = Some(end.clone());
        let _ = self.tx.send(FeedEvent::End(end));
        true
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.replay().end.is_some()
    }

    fn subscribe(&self) -> QuoteSubscription {
        let replay = self.replay();
        let mut pending = VecDeque::with_capacity(2);
        if let Some(latest) = &replay.latest {
            pending.push_back(FeedEvent::Quote(latest.clone()));
        }
        if let Some(end) = &replay.end {
            pending.push_back(FeedEvent::End(end.clone()));
        }
        QuoteSubscription {
            symbol: self.symbol.clone(),
            pending,
            rx: self.tx.subscribe(),
            done: false,
        }
    }
}

/// Shareable handle to one requested quote stream.
///
/// Every observer created through [`QuoteStream::subscribe`] sees the same
/// underlying connection's events.
#[derive(Clone)]
pub struct QuoteStream {
    hub: Arc<FeedHub>,
}

impl QuoteStream {
    pub(crate) fn new(hub: Arc<FeedHub>) -> Self {
        Self { hub }
    }

    pub fn symbol(&self) -> &str {
        &self.hub.symbol
    }

    /// Attach a new observer; it first receives the latest quote, if any.
    pub fn subscribe(&self) -> QuoteSubscription {
        self.hub.subscribe()
    }

    /// Latest delivered quote
    pub fn latest(&self) -> Option<QuoteUpdate> {
        self.hub.replay().latest.clone()
    }

    /// True once the stream was disconnected, superseded, or exhausted
    pub fn is_finished(&self) -> bool {
        self.hub.is_finished()
    }
}

/// One observer of a [`QuoteStream`].
pub struct QuoteSubscription {
    symbol: String,
    pending: VecDeque<FeedEvent>,
    rx: broadcast::Receiver<FeedEvent>,
    done: bool,
}

impl QuoteSubscription {
    /// Next quote.
    ///
    /// Returns `None` after a disconnect. After retry exhaustion it yields
    /// one `Err` and then `None`. Observers that fall behind skip ahead to
    /// newer quotes rather than stalling the feed.
    pub async fn recv(&mut self) -> Option<Result<QuoteUpdate, StreamError>> {
        loop {
            if self.done {
                return None;
            }

            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => match self.rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(symbol = %self.symbol, skipped, "Quote observer lagged, skipping ahead");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        self.done = true;
                        return None;
                    }
                },
            };

            match event {
                FeedEvent::Quote(quote) => return Some(Ok(quote)),
                FeedEvent::End(FeedEnd::Disconnected) => {
                    self.done = true;
                    return None;
                }
                FeedEvent::End(FeedEnd::Failed(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> impl Stream<Item = Result<QuoteUpdate, StreamError>> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|item| (item, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn quote(price: f64, timestamp: i64) -> QuoteUpdate {
        QuoteUpdate {
            symbol: "AAPL".to_string(),
            price,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_first() {
        let hub = FeedHub::new("AAPL", 16);
        let stream = QuoteStream::new(Arc::clone(&hub));

        let mut early = stream.subscribe();
        assert!(hub.publish(quote(150.0, 1)));
        assert_eq!(early.recv().await, Some(Ok(quote(150.0, 1))));

        let mut late = stream.subscribe();
        assert_eq!(late.recv().await, Some(Ok(quote(150.0, 1))));

        assert!(hub.publish(quote(151.0, 2)));
        assert_eq!(early.recv().await, Some(Ok(quote(151.0, 2))));
        assert_eq!(late.recv().await, Some(Ok(quote(151.0, 2))));
    }

    #[tokio::test]
    async fn test_only_latest_is_replayed() {
        let hub = FeedHub::new("AAPL", 16);
        let stream = QuoteStream::new(Arc::clone(&hub));

        hub.publish(quote(1.0, 1));
        hub.publish(quote(2.0, 2));
        hub.publish(quote(3.0, 3));

        let mut sub = stream.subscribe();
        assert_eq!(sub.recv().await, Some(Ok(quote(3.0, 3))));
        assert_eq!(stream.latest(), Some(quote(3.0, 3)));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let hub = FeedHub::new("AAPL", 16);
        let stream = QuoteStream::new(Arc::clone(&hub));
        let mut sub = stream.subscribe();

        assert!(hub.finish(FeedEnd::Disconnected));
        assert!(!hub.publish(quote(1.0, 1)));
        assert!(stream.is_finished());

        assert_eq!(sub.recv().await, None);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_failure_yields_error_then_none() {
        let hub = FeedHub::new("AAPL", 16);
        let stream = QuoteStream::new(Arc::clone(&hub));
        let err = StreamError::RetriesExhausted {
            attempts: 3,
            last_error: "refused".to_string(),
        };

        hub.publish(quote(1.0, 1));
        assert!(hub.finish(FeedEnd::Failed(err.clone())));
        assert!(!hub.finish(FeedEnd::Disconnected));

        // Attaching after the end still replays the last value and the error
        let items: Vec<_> = stream.subscribe().into_stream().collect().await;
        assert_eq!(items, vec![Ok(quote(1.0, 1)), Err(err)]);
    }

    #[tokio::test]
    async fn test_lagging_observer_skips_ahead() {
        let hub = FeedHub::new("AAPL", 2);
        let stream = QuoteStream::new(Arc::clone(&hub));
        let mut sub = stream.subscribe();

        for i in 0..5 {
            hub.publish(quote(100.0 + i as f64, i));
        }

        // Capacity 2: the oldest three were overwritten
        assert_eq!(sub.recv().await, Some(Ok(quote(103.0, 3))));
        assert_eq!(sub.recv().await, Some(Ok(quote(104.0, 4))));
    }
}
