//! Bucket store trait and types.

use crate::error::Result;
use crate::message::{FetchResponse, RequestDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about a single bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketMeta {
    /// Bucket name (prefix plus version tag).
    pub name: String,
    /// Number of stored responses.
    pub entry_count: usize,
    /// Total body size of stored responses in bytes.
    pub total_size_bytes: u64,
    /// When the bucket was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// Statistics across all buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub bucket_count: usize,
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub buckets: Vec<BucketMeta>,
}

/// Storage for named buckets of responses keyed by request descriptor.
///
/// All operations are synchronous to match rusqlite's API; async callers go
/// through [`CacheBucket`](super::CacheBucket), which moves them onto the
/// blocking pool. Writes to the same key are last-write-wins; implementations
/// take no cross-call locks.
pub trait BucketStore: Send + Sync {
    /// Names of every existing bucket.
    fn bucket_names(&self) -> Result<Vec<String>>;

    fn has_bucket(&self, name: &str) -> Result<bool>;

    /// Create the bucket if it does not exist.
    fn open_bucket(&self, name: &str) -> Result<()>;

    /// Delete a bucket and all of its entries.
    ///
    /// Returns `false` if the bucket did not exist.
    fn delete_bucket(&self, name: &str) -> Result<bool>;

    /// Stored response for `descriptor`, if any.
    fn lookup(&self, bucket: &str, descriptor: &RequestDescriptor) -> Result<Option<FetchResponse>>;

    /// Insert or overwrite one entry, creating the bucket if needed.
    ///
    /// Rejects descriptors whose method is not `GET`.
    fn put(&self, bucket: &str, descriptor: &RequestDescriptor, response: &FetchResponse)
        -> Result<()>;

    /// Insert or overwrite every entry, all or nothing.
    ///
    /// The bucket is created as part of the same commit, so a failed call
    /// leaves no bucket behind.
    fn put_all(&self, bucket: &str, entries: &[(RequestDescriptor, FetchResponse)]) -> Result<()>;

    fn stats(&self) -> Result<StoreStats>;
}

pub(crate) fn ensure_cacheable(descriptor: &RequestDescriptor) -> Result<()> {
    if descriptor.is_cacheable() {
        Ok(())
    } else {
        Err(crate::error::OfflineError::Validation {
            field: "method".to_string(),
            message: format!("only GET requests can be cached, got {}", descriptor.method()),
        })
    }
}
