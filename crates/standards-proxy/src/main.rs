//! Standards Proxy - local caching proxy in front of the catalog origin.
//!
//! This binary hosts an [`OfflineWorker`]: it installs and activates the
//! configured cache version at start-up, then hands every incoming request to
//! the worker as a fetch event.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use standards_offline::network::retry_async;
use standards_offline::{
    BucketStore, CacheConfig, HttpFetcher, MemoryBucketStore, NetworkConfig, OfflineError,
    OfflineWorker, RetryConfig, SqliteBucketStore, WorkerSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "standards-proxy")]
#[command(about = "Offline caching proxy for the Jazz Standards client")]
struct Args {
    /// Application origin to proxy (e.g. http://localhost:8080)
    #[arg(long)]
    origin: Url,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Worker settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache database path (defaults to the user cache directory)
    #[arg(long, conflicts_with = "memory")]
    db: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long)]
    memory: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Standards Proxy for {}", args.origin);

    let settings = match &args.config {
        Some(path) => WorkerSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => WorkerSettings::default(),
    };

    let store: Arc<dyn BucketStore> = if args.memory {
        info!("Using in-memory cache store");
        Arc::new(MemoryBucketStore::new())
    } else {
        let db_path = match args.db {
            Some(path) => path,
            None => default_db_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!("Cache database: {}", db_path.display());
        Arc::new(SqliteBucketStore::new(&db_path)?)
    };

    let fetcher = Arc::new(HttpFetcher::with_timeout(
        args.origin.clone(),
        settings.request_timeout(),
    )?);
    let connectivity = fetcher.connectivity();

    let worker = bootstrap_worker(store, fetcher, args.origin.clone(), settings).await?;
    let worker = Arc::new(worker);

    // Start the server
    let state = server::AppState {
        worker: worker.clone(),
        connectivity,
    };
    let addr = server::start_server(state, &args.host, args.port).await?;

    // Print port for the launching process to read (intentional stdout)
    println!("PROXY_PORT={}", addr.port());

    info!("Proxy running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, flushing cache writes");
    worker.settle().await;

    Ok(())
}

/// `<user cache dir>/standards-offline/offline-cache.sqlite`
fn default_db_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("No user cache directory on this platform")?;
    Ok(cache_dir
        .join(CacheConfig::DB_DIR_NAME)
        .join(CacheConfig::DB_FILE_NAME))
}

/// Install and activate the configured version, retrying failed installs.
///
/// A failed attempt leaves its worker redundant, so every attempt starts from
/// a freshly parsed worker. When every attempt fails, a bucket already in the
/// store is served instead; with an empty store start-up fails.
async fn bootstrap_worker(
    store: Arc<dyn BucketStore>,
    fetcher: Arc<HttpFetcher>,
    origin: Url,
    settings: WorkerSettings,
) -> Result<OfflineWorker> {
    let retry = RetryConfig::new()
        .with_max_attempts(NetworkConfig::INSTALL_RETRY_ATTEMPTS)
        .with_base_delay(NetworkConfig::INSTALL_RETRY_BASE_DELAY);

    let (result, stats) = retry_async(
        &retry,
        || {
            let worker = OfflineWorker::new(
                store.clone(),
                fetcher.clone(),
                origin.clone(),
                settings.clone(),
            );
            async move {
                let (installed, activated) = worker.start().await?;
                info!(
                    "Cache '{}' ready: {} assets, {} stale buckets removed",
                    installed.cache_name,
                    installed.assets_cached,
                    activated.deleted_buckets.len()
                );
                Ok::<_, OfflineError>(worker)
            }
        },
        OfflineError::is_retryable,
    )
    .await;

    if stats.attempts > 1 {
        warn!("Worker bootstrap took {} attempts", stats.attempts);
    }
    let install_err = match result {
        Ok(worker) => return Ok(worker),
        Err(e) => e,
    };

    // Keep serving whatever generation the store already holds
    match OfflineWorker::resume(store, fetcher, origin, settings).await? {
        Some(worker) => {
            warn!(
                "Install failed ({}), serving stored cache '{}'",
                install_err,
                worker.cache_name()
            );
            Ok(worker)
        }
        None => Err(install_err).context("Failed to install offline cache"),
    }
}
