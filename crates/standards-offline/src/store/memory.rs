//! In-memory bucket store for tests and ephemeral hosts.

use super::traits::{ensure_cacheable, BucketMeta, BucketStore, StoreStats};
use crate::error::{OfflineError, Result};
use crate::message::{FetchResponse, RequestDescriptor};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct MemoryBucket {
    created_at: Option<DateTime<Utc>>,
    entries: HashMap<RequestDescriptor, FetchResponse>,
}

/// Bucket store that keeps everything in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemoryBucket>>> {
        self.buckets
            .read()
            .map_err(|e| OfflineError::Other(format!("Bucket map poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemoryBucket>>> {
        self.buckets
            .write()
            .map_err(|e| OfflineError::Other(format!("Bucket map poisoned: {}", e)))
    }
}

fn new_bucket() -> MemoryBucket {
    MemoryBucket {
        created_at: Some(Utc::now()),
        entries: HashMap::new(),
    }
}

impl BucketStore for MemoryBucketStore {
    fn bucket_names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn has_bucket(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    fn open_bucket(&self, name: &str) -> Result<()> {
        self.write()?
            .entry(name.to_string())
            .or_insert_with(new_bucket);
        Ok(())
    }

    fn delete_bucket(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    fn lookup(&self, bucket: &str, descriptor: &RequestDescriptor) -> Result<Option<FetchResponse>> {
        if !descriptor.is_cacheable() {
            return Ok(None);
        }
        Ok(self
            .read()?
            .get(bucket)
            .and_then(|b| b.entries.get(descriptor))
            .cloned())
    }

    fn put(
        &self,
        bucket: &str,
        descriptor: &RequestDescriptor,
        response: &FetchResponse,
    ) -> Result<()> {
        ensure_cacheable(descriptor)?;
        self.write()?
            .entry(bucket.to_string())
            .or_insert_with(new_bucket)
            .entries
            .insert(descriptor.clone(), response.clone());
        Ok(())
    }

    fn put_all(&self, bucket: &str, entries: &[(RequestDescriptor, FetchResponse)]) -> Result<()> {
        for (descriptor, _) in entries {
            ensure_cacheable(descriptor)?;
        }
        let mut buckets = self.write()?;
        let target = buckets.entry(bucket.to_string()).or_insert_with(new_bucket);
        for (descriptor, response) in entries {
            target.entries.insert(descriptor.clone(), response.clone());
        }
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let buckets: Vec<BucketMeta> = self
            .read()?
            .iter()
            .map(|(name, bucket)| BucketMeta {
                name: name.clone(),
                entry_count: bucket.entries.len(),
                total_size_bytes: bucket.entries.values().map(|r| r.size_bytes()).sum(),
                created_at: bucket.created_at,
            })
            .collect();

        Ok(StoreStats {
            bucket_count: buckets.len(),
            total_entries: buckets.iter().map(|b| b.entry_count).sum(),
            total_size_bytes: buckets.iter().map(|b| b.total_size_bytes).sum(),
            buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, StatusCode};
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_put_creates_bucket_and_overwrites() {
        let store = MemoryBucketStore::new();
        let descriptor = RequestDescriptor::get(url("/api/categories"));

        store
            .put("v1", &descriptor, &FetchResponse::basic(url("/api/categories"), StatusCode::OK, "a"))
            .unwrap();
        store
            .put("v1", &descriptor, &FetchResponse::basic(url("/api/categories"), StatusCode::OK, "b"))
            .unwrap();

        assert!(store.has_bucket("v1").unwrap());
        let stored = store.lookup("v1", &descriptor).unwrap().unwrap();
        assert_eq!(stored.body.as_ref(), b"b");
    }

    #[test]
    fn test_put_all_rejects_whole_batch() {
        let store = MemoryBucketStore::new();
        let entries = vec![
            (
                RequestDescriptor::get(url("/")),
                FetchResponse::basic(url("/"), StatusCode::OK, "shell"),
            ),
            (
                RequestDescriptor::new(Method::PUT, url("/x")),
                FetchResponse::basic(url("/x"), StatusCode::OK, "x"),
            ),
        ];

        assert!(store.put_all("v1", &entries).is_err());
        assert!(store.bucket_names().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_ignores_non_get() {
        let store = MemoryBucketStore::new();
        let target = url("/api/standards");
        store
            .put(
                "v1",
                &RequestDescriptor::get(target.clone()),
                &FetchResponse::basic(target.clone(), StatusCode::OK, "[]"),
            )
            .unwrap();

        let head = RequestDescriptor::new(Method::HEAD, target);
        assert!(store.lookup("v1", &head).unwrap().is_none());
    }

    #[test]
    fn test_bucket_names_sorted() {
        let store = MemoryBucketStore::new();
        for name in ["v2", "current", "v1"] {
            store.open_bucket(name).unwrap();
        }
        assert_eq!(store.bucket_names().unwrap(), vec!["current", "v1", "v2"]);
        assert!(store.delete_bucket("v1").unwrap());
        assert_eq!(store.stats().unwrap().bucket_count, 2);
    }
}
