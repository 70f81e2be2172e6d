//! Network access, connectivity tracking, and retries.
//!
//! This module provides:
//! - The `Fetcher` seam and its reqwest implementation
//! - Online/offline tracking derived from fetch outcomes
//! - Retry logic with exponential backoff and jitter

mod connectivity;
mod fetcher;
mod retry;

pub use connectivity::{ConnectivitySnapshot, ConnectivityState, ConnectivityTracker};
pub use fetcher::{strip_hop_by_hop, DynFetcher, Fetcher, HttpFetcher};
pub use retry::{retry_async, RetryConfig, RetryStats};
