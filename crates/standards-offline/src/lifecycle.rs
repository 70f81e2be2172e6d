//! Install and activate transitions of a cache version.
//!
//! # States
//!
//! | State | Intercepts fetches | Entered by |
//! |-------|--------------------|------------|
//! | Parsed | no | construction |
//! | Installing | no | install event |
//! | Installed | no | every manifest asset committed |
//! | Activating | no | activate event |
//! | Activated | yes | stale buckets removed, clients claimed |
//! | Redundant | no | install or activate failed |
//!
//! Install is all-or-nothing: every manifest asset is fetched and buffered
//! first, and only when all of them succeeded are they committed to the bucket
//! in one store transaction. A failed install therefore creates no bucket and
//! leaves any previous version authoritative.

use crate::config::AssetManifest;
use crate::error::{OfflineError, Result};
use crate::message::{FetchRequest, RequestDescriptor};
use crate::network::Fetcher;
use crate::store::{BucketStore, CacheBucket};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed = 0,
    Installing = 1,
    Installed = 2,
    Activating = 3,
    Activated = 4,
    Redundant = 5,
}

impl WorkerState {
    /// Only an activated worker answers fetch events.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Atomic wrapper for WorkerState.
pub(crate) struct AtomicWorkerState(AtomicU8);

impl AtomicWorkerState {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        match self.0.load(Ordering::SeqCst) {
            0 => WorkerState::Parsed,
            1 => WorkerState::Installing,
            2 => WorkerState::Installed,
            3 => WorkerState::Activating,
            4 => WorkerState::Activated,
            _ => WorkerState::Redundant,
        }
    }

    pub(crate) fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`, failing if the current state is not `from`.
    pub(crate) fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| OfflineError::InvalidState {
                expected: from.to_string(),
                actual: self.load().to_string(),
            })
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    pub assets_cached: usize,
    /// The new version activates at once instead of waiting for old clients.
    pub skip_waiting: bool,
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub cache_name: String,
    pub deleted_buckets: Vec<String>,
    /// Open clients are controlled immediately, without a reload.
    pub clients_claimed: bool,
}

/// Fetch every manifest asset and commit them to `bucket` atomically.
pub async fn install(
    bucket: &CacheBucket,
    fetcher: &dyn Fetcher,
    manifest: &AssetManifest,
    origin: &Url,
) -> Result<InstallReport> {
    let urls = manifest.resolve(origin)?;
    info!("Caching {} assets into '{}'", urls.len(), bucket.name());

    let fetches = urls.into_iter().map(|url| async move {
        let response = fetcher
            .fetch(FetchRequest::get(url.clone()))
            .await
            .map_err(|e| OfflineError::InstallFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.is_ok() {
            return Err(OfflineError::InstallFailed {
                url: url.to_string(),
                message: format!("unexpected status {}", response.status),
            });
        }

        debug!("Fetched manifest asset {}", url);
        Ok((RequestDescriptor::get(url), response))
    });

    // First failure drops the remaining fetches and everything buffered so far
    let entries = try_join_all(fetches).await?;
    let assets_cached = entries.len();
    bucket.put_all(entries).await?;

    info!("Installed cache '{}' with {} assets", bucket.name(), assets_cached);
    Ok(InstallReport {
        cache_name: bucket.name().to_string(),
        assets_cached,
        skip_waiting: true,
    })
}

/// Delete every bucket except `current`.
pub async fn activate(store: Arc<dyn BucketStore>, current: &str) -> Result<ActivateReport> {
    let current = current.to_string();

    let deleted_buckets = tokio::task::spawn_blocking({
        let current = current.clone();
        move || -> Result<Vec<String>> {
            let mut deleted = Vec::new();
            for name in store.bucket_names()? {
                if name != current {
                    info!("Deleting old cache: {}", name);
                    if store.delete_bucket(&name)? {
                        deleted.push(name);
                    }
                }
            }
            Ok(deleted)
        }
    })
    .await??;

    info!(
        "Activated cache '{}' ({} stale buckets removed)",
        current,
        deleted_buckets.len()
    );
    Ok(ActivateReport {
        cache_name: current,
        deleted_buckets,
        clients_claimed: true,
    })
}
