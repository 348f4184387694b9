//! Scripted transport for driving the stream client in tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::error::TransportError;
use crate::traits::{QuoteSession, QuoteTransport};

pub(crate) enum SessionEvent {
    Frame(String),
    CleanClose,
    Fail(String),
}

enum Step {
    Refuse,
    Accept(mpsc::UnboundedReceiver<SessionEvent>),
}

#[derive(Default)]
struct Inner {
    steps: Mutex<VecDeque<Step>>,
    opens: Mutex<Vec<Instant>>,
    urls: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    closes: AtomicUsize,
}

/// Each `open` consumes the next scripted step; with none left it refuses.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refuse(&self, count: usize) {
        let mut steps = self.inner.steps.lock().unwrap();
        for _ in 0..count {
            steps.push_back(Step::Refuse);
        }
    }

    pub(crate) fn accept(&self) -> SessionControl {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.steps.lock().unwrap().push_back(Step::Accept(rx));
        SessionControl { tx }
    }

    pub(crate) fn open_times(&self) -> Vec<Instant> {
        self.inner.opens.lock().unwrap().clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.inner.opens.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.inner.urls.lock().unwrap().clone()
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub(crate) fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.inner.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteTransport for ScriptedTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn QuoteSession>, TransportError> {
        self.inner.opens.lock().unwrap().push(Instant::now());
        self.inner.urls.lock().unwrap().push(url.to_string());

        let step = self.inner.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(rx)) => {
                let live = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.inner.max_live.fetch_max(live, Ordering::SeqCst);
                Ok(Box::new(ScriptedSession {
                    rx,
                    inner: Arc::clone(&self.inner),
                }))
            }
            Some(Step::Refuse) | None => {
                Err(TransportError::Connection("connection refused".to_string()))
            }
        }
    }
}

struct ScriptedSession {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    inner: Arc<Inner>,
}

#[async_trait]
impl QuoteSession for ScriptedSession {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(SessionEvent::Frame(text)) => Ok(Some(text)),
            Some(SessionEvent::CleanClose) => Ok(None),
            Some(SessionEvent::Fail(msg)) => Err(TransportError::Connection(msg)),
            // Control handle dropped: stay silent like an idle server
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Test-side handle pushing events into one accepted session
pub(crate) struct SessionControl {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionControl {
    pub(crate) fn frame(&self, raw: &str) {
        let _ = self.tx.send(SessionEvent::Frame(raw.to_string()));
    }

    pub(crate) fn quote(&self, symbol: &str, price: f64, timestamp: i64) {
        self.frame(&format!(
            r#"{{"type":"stockQuote","symbol":"{}","data":{{"price":{},"timestamp":{}}}}}"#,
            symbol, price, timestamp
        ));
    }

    pub(crate) fn close_cleanly(&self) {
        let _ = self.tx.send(SessionEvent::CleanClose);
    }

    pub(crate) fn fail(&self, msg: &str) {
        let _ = self.tx.send(SessionEvent::Fail(msg.to_string()));
    }
}
