//! Standards Offline - request cache for the Jazz Standards web client.
//!
//! Every request the page issues is handed to an [`OfflineWorker`], which
//! decides per request whether to answer from its versioned cache bucket or
//! from the network:
//!
//! - Non-`GET` requests pass through untouched and are never cached
//! - Data endpoints (`/api/`) are network-first with a cache fallback offline
//! - Everything else is cache-first, populated on the first successful fetch
//!
//! Installing a version caches the application shell atomically; activating
//! it deletes every other bucket.
//!
//! # Example
//!
//! ```rust,ignore
//! use standards_offline::{HttpFetcher, OfflineWorker, SqliteBucketStore, WorkerSettings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> standards_offline::Result<()> {
//!     let origin = url::Url::parse("http://localhost:8080/").unwrap();
//!     let store = Arc::new(SqliteBucketStore::new("/tmp/offline.sqlite")?);
//!     let fetcher = Arc::new(HttpFetcher::new(origin.clone())?);
//!     let worker = OfflineWorker::new(store, fetcher, origin.clone(), WorkerSettings::default());
//!
//!     worker.start().await?;
//!     let response = worker
//!         .respond(standards_offline::FetchRequest::get(origin.join("/api/standards").unwrap()))
//!         .await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod network;
pub mod store;
pub mod strategy;
pub mod worker;

pub use classify::{classify, RequestClass};
pub use config::{AssetManifest, CacheConfig, CacheVersion, NetworkConfig, WorkerSettings};
pub use error::{OfflineError, Result};
pub use lifecycle::{ActivateReport, InstallReport, WorkerState};
pub use message::{FetchRequest, FetchResponse, RequestDescriptor, ResponseType};
pub use network::{
    ConnectivitySnapshot, ConnectivityState, ConnectivityTracker, DynFetcher, Fetcher,
    HttpFetcher, RetryConfig,
};
pub use store::{
    BackgroundWrites, BucketMeta, BucketStore, CacheBucket, MemoryBucketStore, SqliteBucketStore,
    StoreStats,
};
pub use worker::{EventOutcome, FetchOutcome, OfflineWorker, WorkerEvent, WorkerStatus};
