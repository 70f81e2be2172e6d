//! Async handle onto one named bucket.

use super::traits::BucketStore;
use crate::error::Result;
use crate::message::{FetchResponse, RequestDescriptor};
use std::sync::Arc;

/// A named bucket inside a shared store.
///
/// Clones share the same store. Store calls run on tokio's blocking pool.
#[derive(Clone)]
pub struct CacheBucket {
    name: Arc<str>,
    store: Arc<dyn BucketStore>,
}

impl CacheBucket {
    pub fn new(store: Arc<dyn BucketStore>, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    pub async fn lookup(&self, descriptor: &RequestDescriptor) -> Result<Option<FetchResponse>> {
        if !descriptor.is_cacheable() {
            return Ok(None);
        }
        let (store, name) = (self.store.clone(), self.name.clone());
        let descriptor = descriptor.clone();
        tokio::task::spawn_blocking(move || store.lookup(&name, &descriptor)).await?
    }

    pub async fn put(&self, descriptor: RequestDescriptor, response: FetchResponse) -> Result<()> {
        let (store, name) = (self.store.clone(), self.name.clone());
        tokio::task::spawn_blocking(move || store.put(&name, &descriptor, &response)).await?
    }

    pub async fn put_all(&self, entries: Vec<(RequestDescriptor, FetchResponse)>) -> Result<()> {
        let (store, name) = (self.store.clone(), self.name.clone());
        tokio::task::spawn_blocking(move || store.put_all(&name, &entries)).await?
    }
}

impl std::fmt::Debug for CacheBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBucket").field("name", &self.name).finish()
    }
}
