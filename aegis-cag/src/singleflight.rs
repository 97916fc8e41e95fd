//! Single-flight coalescing keyed by `qid` (spec §4.6 "Concurrency"): at
//! most one downstream `Generate` call runs per key at a time; other
//! callers await the same result. The call itself runs on a detached
//! `tokio::spawn`ed task, so a caller dropping its own await never cancels
//! the in-flight generation — only the last subscriber finishing drives
//! cleanup, and even an abandoned call still completes and populates the
//! cache for whoever asks next.

use aegis_core::CacheEntryId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct SingleFlight<T> {
    inflight: Arc<Mutex<HashMap<CacheEntryId, broadcast::Sender<T>>>>,
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `f` for `key`, or join an already-running call for the same key.
    /// A subscriber that joins between the leader's `tx.send` and its map
    /// cleanup finds the channel already closed; it re-enters the loop and
    /// either joins the next leader or becomes one itself, rather than
    /// treating a closed channel as a fatal condition.
    pub async fn run_or_join<F, Fut>(&self, key: CacheEntryId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        loop {
            let mut guard = self.inflight.lock();
            if let Some(tx) = guard.get(&key) {
                let mut rx = tx.subscribe();
                drop(guard);
                match rx.recv().await {
                    Ok(result) => return result,
                    Err(broadcast::error::RecvError::Closed) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }

            let (tx, _placeholder_rx) = broadcast::channel(1);
            guard.insert(key, tx.clone());
            drop(guard);

            let mut rx = tx.subscribe();
            let inflight = Arc::clone(&self.inflight);
            let fut = f();
            tokio::spawn(async move {
                let result = fut.await;
                let _ = tx.send(result);
                inflight.lock().remove(&key);
            });

            return rx.recv().await.expect("spawned task always sends before exiting");
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

impl<T: Clone + Send + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
