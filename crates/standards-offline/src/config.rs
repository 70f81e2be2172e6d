//! Centralized configuration for the offline cache.
//!
//! Constants describe the shipped application shell. `WorkerSettings` lets a
//! host override them from a JSON file; whenever the asset manifest changes the
//! cache version must change with it, since the version is the only thing that
//! invalidates a bucket.

use crate::error::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Cache naming and application shell.
pub struct CacheConfig;

impl CacheConfig {
    pub const CACHE_PREFIX: &'static str = "jazz-standards";
    pub const CACHE_VERSION: &'static str = "v1";
    pub const ASSET_MANIFEST: &'static [&'static str] = &[
        "/",
        "/static/css/styles.css",
        "/static/js/api.js",
        "/static/js/app.js",
        "/manifest.json",
    ];
    pub const DB_DIR_NAME: &'static str = "standards-offline";
    pub const DB_FILE_NAME: &'static str = "offline-cache.sqlite";
}

/// Request classification and network behaviour.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Substring that marks a data endpoint.
    pub const API_PREFIX: &'static str = "/api/";
    /// The only method that takes part in caching.
    pub const CACHEABLE_METHOD: &'static str = "GET";
    /// The only status a strategy will store.
    pub const CACHEABLE_STATUS: u16 = 200;
    pub const USER_AGENT: &'static str = "standards-offline/0.1";
    pub const INSTALL_RETRY_ATTEMPTS: u32 = 5;
    pub const INSTALL_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
}

/// Versioned bucket identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVersion {
    prefix: String,
    tag: String,
}

impl CacheVersion {
    pub fn new(prefix: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tag: tag.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Name of the bucket owned by this version, e.g. `jazz-standards-v1`.
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.prefix, self.tag)
    }
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::new(CacheConfig::CACHE_PREFIX, CacheConfig::CACHE_VERSION)
    }
}

impl std::fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bucket_name())
    }
}

/// Resources that must be cached before a version may activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    entries: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against the application origin.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
        self.entries
            .iter()
            .map(|entry| {
                origin.join(entry).map_err(|e| OfflineError::Validation {
                    field: "asset_manifest".to_string(),
                    message: format!("cannot resolve {:?} against {}: {}", entry, origin, e),
                })
            })
            .collect()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(CacheConfig::ASSET_MANIFEST.iter().copied())
    }
}

/// Host-tunable worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkerSettings {
    pub cache_prefix: String,
    pub cache_version: String,
    pub api_prefix: String,
    pub asset_manifest: Vec<String>,
    /// Per-request timeout in seconds; `None` leaves it to the HTTP stack.
    pub request_timeout_secs: Option<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            cache_prefix: CacheConfig::CACHE_PREFIX.to_string(),
            cache_version: CacheConfig::CACHE_VERSION.to_string(),
            api_prefix: NetworkConfig::API_PREFIX.to_string(),
            asset_manifest: CacheConfig::ASSET_MANIFEST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            request_timeout_secs: None,
        }
    }
}

impl WorkerSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| OfflineError::io_with_path(e, path))?;
        let settings: WorkerSettings = serde_json::from_str(&raw).map_err(|e| OfflineError::Config {
            message: format!("Invalid settings in {}: {}", path.display(), e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("cache_prefix", &self.cache_prefix),
            ("cache_version", &self.cache_version),
            ("api_prefix", &self.api_prefix),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OfflineError::Validation {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        if let Some(entry) = self.asset_manifest.iter().find(|e| e.trim().is_empty()) {
            return Err(OfflineError::Validation {
                field: "asset_manifest".to_string(),
                message: format!("empty entry {:?}", entry),
            });
        }
        if self.request_timeout_secs == Some(0) {
            return Err(OfflineError::Validation {
                field: "request_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn version(&self) -> CacheVersion {
        CacheVersion::new(&self.cache_prefix, &self.cache_version)
    }

    pub fn manifest(&self) -> AssetManifest {
        AssetManifest::new(self.asset_manifest.iter().cloned())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
