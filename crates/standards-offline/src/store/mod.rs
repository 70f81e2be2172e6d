//! Versioned bucket storage.
//!
//! A bucket maps request descriptors to stored responses. Only one bucket is
//! authoritative at a time; its name carries the cache version, and activation
//! deletes every other name.
//!
//! - `SqliteBucketStore`: persistent, one database file for all buckets
//! - `MemoryBucketStore`: process-local, used by tests and `--memory` hosts

mod bucket;
mod memory;
mod sqlite;
mod traits;
mod writes;

pub use bucket::CacheBucket;
pub use memory::MemoryBucketStore;
pub use sqlite::SqliteBucketStore;
pub use traits::{BucketMeta, BucketStore, StoreStats};
pub use writes::BackgroundWrites;
