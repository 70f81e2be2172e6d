//! Network access for the worker.
//!
//! A [`Fetcher`] performs one request and either resolves with a response
//! (whatever its status) or rejects because the network could not be reached.
//! [`HttpFetcher`] is the reqwest-backed implementation:
//! - Forwards method, headers and body, minus hop-by-hop headers
//! - Buffers the whole body so the response can be duplicated
//! - Tags responses as same-origin (`basic`) or cross-origin (`cors`)
//! - Feeds a shared [`ConnectivityTracker`]

use super::connectivity::ConnectivityTracker;
use crate::config::NetworkConfig;
use crate::error::{OfflineError, Result};
use crate::message::{FetchRequest, FetchResponse, ResponseType};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Performs network requests on behalf of the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve with the origin's response, or reject with a network failure.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

/// Shared fetcher handle.
pub type DynFetcher = Arc<dyn Fetcher>;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Copy of `headers` without connection-scoped headers.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP {
        forwarded.remove(*name);
    }
    forwarded
}

/// reqwest-backed fetcher bound to the application origin.
pub struct HttpFetcher {
    client: Client,
    origin: Url,
    timeout: Option<Duration>,
    connectivity: Arc<ConnectivityTracker>,
}

impl HttpFetcher {
    /// Fetcher with no timeout beyond the HTTP stack's own.
    pub fn new(origin: Url) -> Result<Self> {
        Self::with_timeout(origin, None)
    }

    pub fn with_timeout(origin: Url, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(NetworkConfig::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| OfflineError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(e),
        })?;

        Ok(Self {
            client,
            origin,
            timeout,
            connectivity: Arc::new(ConnectivityTracker::new()),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn connectivity(&self) -> Arc<ConnectivityTracker> {
        self.connectivity.clone()
    }

    fn response_type(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }

    fn rejected(&self, method: &Method, url: &Url, err: reqwest::Error) -> OfflineError {
        self.connectivity.record_failure();
        if err.is_timeout() {
            OfflineError::Timeout(self.timeout.unwrap_or_default())
        } else {
            OfflineError::Network {
                message: format!("{} {} failed: {}", method, url, err),
                source: Some(err),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let FetchRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(strip_hop_by_hop(&headers));
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.rejected(&method, &url, e))?;

        let final_url = response.url().clone();
        let status = response.status();
        let response_headers = strip_hop_by_hop(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| self.rejected(&method, &url, e))?;

        self.connectivity.record_success();
        debug!("{} {} -> {}", method, url, status);

        Ok(FetchResponse {
            redirected: final_url != url,
            response_type: self.response_type(&final_url),
            url: final_url,
            status,
            headers: response_headers,
            body,
        })
    }
}
