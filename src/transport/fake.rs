//! Scripted connector for session tests.
//!
//! Every `open` call is recorded together with the credentials it received
//! and the sending half of its event stream, so tests can play the remote
//! side of any transport generation, including ones the manager already
//! discarded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, Transport, TransportError, TransportEvent, TransportHandle};
use crate::store::Credentials;

#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    attempts: usize,
    opens: Vec<FakeOpen>,
    fail_opens: usize,
    delays: VecDeque<Duration>,
}

struct FakeOpen {
    credentials: Credentials,
    events: mpsc::Sender<TransportEvent>,
    transport: Arc<FakeTransport>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` open calls fail as if the gateway were unreachable.
    pub fn fail_next_opens(&self, n: usize) {
        self.inner.lock().fail_opens = n;
    }

    /// Delay completion of the next successful open.
    pub fn delay_next_open(&self, delay: Duration) {
        self.inner.lock().delays.push_back(delay);
    }

    /// Open calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    /// Successful open calls so far.
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens.len()
    }

    pub fn credentials(&self, index: usize) -> Credentials {
        self.inner.lock().opens[index].credentials.clone()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        Arc::clone(&self.inner.lock().opens[index].transport)
    }

    /// Play an event on the stream of transport `index`. Returns false if
    /// nobody listens any more.
    pub fn emit(&self, index: usize, event: TransportEvent) -> bool {
        let events = self.inner.lock().opens[index].events.clone();
        events.try_send(event).is_ok()
    }

    /// End the event stream of transport `index` without a close event.
    pub fn drop_events(&self, index: usize) {
        let (dead, _) = mpsc::channel(1);
        self.inner.lock().opens[index].events = dead;
    }

    /// Wait until at least `n` successful opens happened.
    pub async fn wait_for_opens(&self, n: usize) {
        let wait = async {
            while self.open_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(2), wait).await.is_err() {
            panic!("expected {n} opens, saw {}", self.open_count());
        }
    }

    /// Number of transports not closed yet.
    pub fn live_transports(&self) -> usize {
        self.inner
            .lock()
            .opens
            .iter()
            .filter(|open| !open.transport.is_closed())
            .count()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, credentials: Credentials) -> Result<TransportHandle, TransportError> {
        let (transport, events, delay) = {
            let mut inner = self.inner.lock();
            inner.attempts += 1;
            if inner.fail_opens > 0 {
                inner.fail_opens -= 1;
                return Err(TransportError::Connect("gateway unreachable".into()));
            }
            let (tx, rx) = mpsc::channel(64);
            let transport = Arc::new(FakeTransport::default());
            inner.opens.push(FakeOpen {
                credentials,
                events: tx,
                transport: Arc::clone(&transport),
            });
            (transport, rx, inner.delays.pop_front())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TransportHandle { transport, events })
    }
}

#[derive(Default)]
pub struct FakeTransport {
    closed: AtomicBool,
    logouts: AtomicUsize,
    logout_error: Mutex<Option<String>>,
    logout_hangs: AtomicBool,
    lookups: Mutex<Vec<String>>,
    photo: Mutex<Option<Result<Option<String>, String>>>,
}

impl FakeTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn fail_logout(&self, message: &str) {
        *self.logout_error.lock() = Some(message.to_string());
    }

    /// Never answer logout requests.
    pub fn hang_logout(&self) {
        self.logout_hangs.store(true, Ordering::SeqCst);
    }

    /// Addresses passed to `profile_photo_url`, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }

    /// Answer for subsequent lookups; `Err` becomes a remote error.
    pub fn set_photo(&self, answer: Result<Option<String>, String>) {
        *self.photo.lock() = Some(answer);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn logout(&self) -> Result<(), TransportError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.logout_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.logout_error.lock().clone() {
            Some(message) => Err(TransportError::Remote(message)),
            None => Ok(()),
        }
    }

    async fn profile_photo_url(&self, address: &str) -> Result<Option<String>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.lookups.lock().push(address.to_string());
        match self.photo.lock().clone() {
            Some(Ok(url)) => Ok(url),
            Some(Err(message)) => Err(TransportError::Remote(message)),
            None => Ok(None),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
