//! Cache-first handling for static assets.

use crate::error::Result;
use crate::message::{FetchRequest, FetchResponse};
use crate::network::Fetcher;
use crate::store::{BackgroundWrites, CacheBucket};
use tracing::{debug, warn};

/// Serve a stored asset without touching the network; fetch and store on a miss.
///
/// Stored entries are never revalidated: assets are immutable for the life of
/// a cache version. Fetched responses are stored only when they are a plain
/// same-origin, non-redirected 200; anything else goes back to the caller
/// untouched. Concurrent misses for the same asset each fetch and store, and
/// the last write wins.
pub async fn cache_first(
    request: FetchRequest,
    bucket: &CacheBucket,
    fetcher: &dyn Fetcher,
    writes: &BackgroundWrites,
) -> Result<FetchResponse> {
    let descriptor = request.descriptor();

    match bucket.lookup(&descriptor).await {
        Ok(Some(cached)) => {
            debug!("Serving {} from '{}'", descriptor, bucket.name());
            return Ok(cached);
        }
        Ok(None) => {}
        Err(e) => warn!("Cache lookup for {} failed, using network: {}", descriptor, e),
    }

    let response = fetcher.fetch(request).await?;

    if response.is_cacheable_asset() {
        writes.spawn_put(bucket.clone(), descriptor, response.duplicate());
    } else {
        debug!(
            "Not caching {} (status {}, type {}, redirected {})",
            descriptor, response.status, response.response_type, response.redirected
        );
    }

    Ok(response)
}
