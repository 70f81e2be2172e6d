//! Network-first handling for data endpoints.

use crate::error::Result;
use crate::message::FetchRequest;
use crate::message::FetchResponse;
use crate::network::Fetcher;
use crate::store::{BackgroundWrites, CacheBucket};
use tracing::{debug, warn};

/// Serve live data, falling back to the last stored snapshot when offline.
///
/// A resolved fetch is returned as-is; when its status is exactly 200 a
/// duplicate is written to `bucket` in the background, replacing any previous
/// entry. Only a rejected fetch consults the bucket. A stored entry is
/// returned without any staleness marker; a miss propagates the original
/// network error.
pub async fn network_first(
    request: FetchRequest,
    bucket: &CacheBucket,
    fetcher: &dyn Fetcher,
    writes: &BackgroundWrites,
) -> Result<FetchResponse> {
    let descriptor = request.descriptor();

    let network_err = match fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_clean_ok() {
                writes.spawn_put(bucket.clone(), descriptor, response.duplicate());
            } else {
                debug!("Not caching {} (status {})", descriptor, response.status);
            }
            return Ok(response);
        }
        Err(e) if e.is_network_failure() => e,
        Err(e) => return Err(e),
    };

    match bucket.lookup(&descriptor).await {
        Ok(Some(cached)) => {
            debug!("Network unavailable, serving stored {}", descriptor);
            Ok(cached)
        }
        Ok(None) => {
            debug!("Network unavailable and nothing stored for {}", descriptor);
            Err(network_err)
        }
        Err(store_err) => {
            warn!(
                "Cache lookup for {} failed while offline: {}",
                descriptor, store_err
            );
            Err(network_err)
        }
    }
}
