//! The offline worker: one cache version and its event handlers.

use crate::classify::{classify, RequestClass};
use crate::config::{CacheVersion, WorkerSettings};
use crate::error::Result;
use crate::lifecycle::{self, ActivateReport, AtomicWorkerState, InstallReport, WorkerState};
use crate::message::{FetchRequest, FetchResponse};
use crate::network::DynFetcher;
use crate::store::{BackgroundWrites, BucketStore, CacheBucket, StoreStats};
use crate::strategy::{cache_first, network_first};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Events delivered to the worker by its host.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
}

/// What the worker did with an event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
}

/// What the worker did with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The worker answered the request.
    Responded(FetchResponse),
    /// The worker declined; the host performs the request itself.
    Passthrough(FetchRequest),
}

/// Snapshot for host status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub cache_name: String,
    pub api_prefix: String,
    pub pending_writes: usize,
    pub store: StoreStats,
}

/// A single cache version bound to its store and network.
pub struct OfflineWorker {
    settings: WorkerSettings,
    version: CacheVersion,
    origin: Url,
    bucket: CacheBucket,
    fetcher: DynFetcher,
    writes: BackgroundWrites,
    state: AtomicWorkerState,
}

impl OfflineWorker {
    pub fn new(
        store: Arc<dyn BucketStore>,
        fetcher: DynFetcher,
        origin: Url,
        settings: WorkerSettings,
    ) -> Self {
        let name = settings.version().bucket_name();
        Self::bound(store, name, fetcher, origin, settings, WorkerState::Parsed)
    }

    /// An activated worker serving a bucket already in `store`, without
    /// installing anything.
    ///
    /// Prefers the bucket of the configured version, then the most recently
    /// created one. Returns `None` when the store holds no bucket. Hosts use
    /// this when install fails, so the last good version stays authoritative.
    pub async fn resume(
        store: Arc<dyn BucketStore>,
        fetcher: DynFetcher,
        origin: Url,
        settings: WorkerSettings,
    ) -> Result<Option<Self>> {
        let current = settings.version().bucket_name();
        let name = tokio::task::spawn_blocking({
            let store = store.clone();
            move || -> Result<Option<String>> {
                if store.has_bucket(&current)? {
                    return Ok(Some(current));
                }
                Ok(store
                    .stats()?
                    .buckets
                    .into_iter()
                    .max_by_key(|b| b.created_at)
                    .map(|b| b.name))
            }
        })
        .await??;

        Ok(name.map(|name| {
            info!("Resuming stored cache '{}'", name);
            Self::bound(store, name, fetcher, origin, settings, WorkerState::Activated)
        }))
    }

    fn bound(
        store: Arc<dyn BucketStore>,
        bucket_name: String,
        fetcher: DynFetcher,
        origin: Url,
        settings: WorkerSettings,
        state: WorkerState,
    ) -> Self {
        Self {
            version: settings.version(),
            settings,
            origin,
            bucket: CacheBucket::new(store, bucket_name),
            fetcher,
            writes: BackgroundWrites::new(),
            state: AtomicWorkerState::new(state),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn cache_name(&self) -> &str {
        self.bucket.name()
    }

    pub fn bucket(&self) -> &CacheBucket {
        &self.bucket
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn writes(&self) -> &BackgroundWrites {
        &self.writes
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.handle_install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.handle_activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.handle_fetch(request).await.map(EventOutcome::Fetch),
        }
    }

    /// Install then activate at once, since install always asks to skip waiting.
    pub async fn start(&self) -> Result<(InstallReport, ActivateReport)> {
        let installed = self.handle_install().await?;
        let activated = self.handle_activate().await?;
        Ok((installed, activated))
    }

    pub async fn handle_install(&self) -> Result<InstallReport> {
        self.state
            .transition(WorkerState::Parsed, WorkerState::Installing)?;

        match lifecycle::install(
            &self.bucket,
            self.fetcher.as_ref(),
            &self.settings.manifest(),
            &self.origin,
        )
        .await
        {
            Ok(report) => {
                self.state.store(WorkerState::Installed);
                Ok(report)
            }
            Err(e) => {
                warn!("Install of '{}' failed: {}", self.cache_name(), e);
                self.state.store(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    pub async fn handle_activate(&self) -> Result<ActivateReport> {
        self.state
            .transition(WorkerState::Installed, WorkerState::Activating)?;

        match lifecycle::activate(self.bucket.store().clone(), self.cache_name()).await {
            Ok(report) => {
                self.state.store(WorkerState::Activated);
                Ok(report)
            }
            Err(e) => {
                warn!("Activation of '{}' failed: {}", self.cache_name(), e);
                self.state.store(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Answer or decline an intercepted request.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchOutcome> {
        let class = if self.state().can_intercept_fetch() {
            classify(&request, &self.settings.api_prefix)
        } else {
            RequestClass::Passthrough
        };
        debug!("{} {} -> {}", request.method, request.url, class);

        let fetcher = self.fetcher.as_ref();
        match class {
            RequestClass::Passthrough => Ok(FetchOutcome::Passthrough(request)),
            RequestClass::NetworkFirst => network_first(request, &self.bucket, fetcher, &self.writes)
                .await
                .map(FetchOutcome::Responded),
            RequestClass::CacheFirst => cache_first(request, &self.bucket, fetcher, &self.writes)
                .await
                .map(FetchOutcome::Responded),
        }
    }

    /// Produce a response for any request, performing declined ones directly.
    ///
    /// Declined requests go to the network unchanged and their responses are
    /// never stored.
    pub async fn respond(&self, request: FetchRequest) -> Result<FetchResponse> {
        match self.handle_fetch(request).await? {
            FetchOutcome::Responded(response) => Ok(response),
            FetchOutcome::Passthrough(request) => self.fetcher.fetch(request).await,
        }
    }

    /// Wait for outstanding background cache writes.
    pub async fn settle(&self) {
        self.writes.settle().await;
    }

    pub async fn status(&self) -> Result<WorkerStatus> {
        let store = self.bucket.store().clone();
        let stats = tokio::task::spawn_blocking(move || store.stats()).await??;
        Ok(WorkerStatus {
            state: self.state(),
            cache_name: self.cache_name().to_string(),
            api_prefix: self.settings.api_prefix.clone(),
            pending_writes: self.writes.pending(),
            store: stats,
        })
    }
}
