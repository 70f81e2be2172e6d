//! Per-request cache strategies.
//!
//! Both strategies take the bucket, fetcher and write tracker as explicit
//! handles, so they run the same against SQLite and the real network as
//! against an in-memory store and a scripted fetcher.

mod cache_first;
mod network_first;

pub use cache_first::cache_first;
pub use network_first::network_first;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OfflineError, Result};
    use crate::message::{FetchRequest, FetchResponse, ResponseType};
    use crate::network::Fetcher;
    use crate::store::{BackgroundWrites, BucketStore, CacheBucket, MemoryBucketStore};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// Replays queued outcomes and counts calls.
    #[derive(Default)]
    struct ScriptedFetcher {
        outcomes: Mutex<VecDeque<Result<FetchResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn push(&self, outcome: Result<FetchResponse>) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OfflineError::network("no scripted outcome")))
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080").unwrap().join(path).unwrap()
    }

    fn setup() -> (Arc<MemoryBucketStore>, CacheBucket, ScriptedFetcher, BackgroundWrites) {
        let store = Arc::new(MemoryBucketStore::new());
        let bucket = CacheBucket::new(store.clone(), "jazz-standards-v1");
        (store, bucket, ScriptedFetcher::default(), BackgroundWrites::new())
    }

    #[tokio::test]
    async fn test_network_first_skips_non_200() {
        let (store, bucket, fetcher, writes) = setup();
        fetcher.push(Ok(FetchResponse::basic(
            url("/api/standards/99"),
            StatusCode::NOT_FOUND,
            r#"{"error":"not found"}"#,
        )));

        let response = network_first(FetchRequest::get(url("/api/standards/99")), &bucket, &fetcher, &writes)
            .await
            .unwrap();
        writes.settle().await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(store.stats().unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_network_first_propagates_non_network_errors() {
        let (_store, bucket, fetcher, writes) = setup();
        fetcher.push(Err(OfflineError::Other("malformed request".into())));

        let err = network_first(FetchRequest::get(url("/api/standards")), &bucket, &fetcher, &writes)
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineError::Other(_)));
    }

    #[tokio::test]
    async fn test_cache_first_skips_cross_origin() {
        let (store, bucket, fetcher, writes) = setup();
        let mut response = FetchResponse::basic(url("/static/font.woff2"), StatusCode::OK, "font");
        response.response_type = ResponseType::Cors;
        fetcher.push(Ok(response.clone()));

        let served = cache_first(FetchRequest::get(url("/static/font.woff2")), &bucket, &fetcher, &writes)
            .await
            .unwrap();
        writes.settle().await;

        assert_eq!(served, response);
        assert_eq!(store.stats().unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_cache_first_skips_redirected() {
        let (store, bucket, fetcher, writes) = setup();
        let mut response = FetchResponse::basic(url("/login.html"), StatusCode::OK, "login");
        response.redirected = true;
        fetcher.push(Ok(response));

        cache_first(FetchRequest::get(url("/profile")), &bucket, &fetcher, &writes)
            .await
            .unwrap();
        writes.settle().await;

        assert_eq!(store.stats().unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_propagates_network_error() {
        let (_store, bucket, fetcher, writes) = setup();
        fetcher.push(Err(OfflineError::network("connection refused")));

        let err = cache_first(FetchRequest::get(url("/static/js/app.js")), &bucket, &fetcher, &writes)
            .await
            .unwrap_err();

        assert!(err.is_network_failure());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_last_write_wins() {
        let (store, bucket, fetcher, writes) = setup();
        fetcher.push(Ok(FetchResponse::basic(url("/a.js"), StatusCode::OK, "same")));
        fetcher.push(Ok(FetchResponse::basic(url("/a.js"), StatusCode::OK, "same")));

        let (first, second) = tokio::join!(
            cache_first(FetchRequest::get(url("/a.js")), &bucket, &fetcher, &writes),
            cache_first(FetchRequest::get(url("/a.js")), &bucket, &fetcher, &writes),
        );
        writes.settle().await;

        assert_eq!(first.unwrap().body, second.unwrap().body);
        // Both lookups normally miss; either way a single entry remains
        assert!((1..=2).contains(&fetcher.calls()));
        assert_eq!(store.stats().unwrap().total_entries, 1);
    }
}
