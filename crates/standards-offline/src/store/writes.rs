//! Fire-and-forget cache writes.

use super::bucket::CacheBucket;
use crate::message::{FetchResponse, RequestDescriptor};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Tracks cache writes that run off the response path.
///
/// A strategy hands its duplicate response to [`spawn_put`](Self::spawn_put)
/// and returns immediately. Hosts that need the writes to have landed (tests,
/// shutdown) call [`settle`](Self::settle).
#[derive(Clone, Default)]
pub struct BackgroundWrites {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response` under `descriptor` in a detached task.
    ///
    /// Failures are logged; the response already went back to the caller.
    pub fn spawn_put(&self, bucket: CacheBucket, descriptor: RequestDescriptor, response: FetchResponse) {
        let handle = tokio::spawn(async move {
            let key = descriptor.to_string();
            match bucket.put(descriptor, response).await {
                Ok(()) => debug!("Cached {} in '{}'", key, bucket.name()),
                Err(e) => warn!("Failed to cache {} in '{}': {}", key, bucket.name(), e),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Number of writes that have not finished yet.
    pub fn pending(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every write spawned so far, including ones spawned meanwhile.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *pending)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Background cache write aborted: {}", e);
                }
            }
        }
    }
}
