//! Request and response values that flow through the worker.

use crate::config::NetworkConfig;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Cache key: the method and absolute URL of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Descriptor for a `GET` of `url`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether this request may be read from or written to a bucket.
    pub fn is_cacheable(&self) -> bool {
        self.method.as_str() == NetworkConfig::CACHEABLE_METHOD
    }

    /// Stable string form used as a storage key.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn descriptor(&self) -> RequestDescriptor {
        RequestDescriptor::new(self.method.clone(), self.url.clone())
    }
}

/// Origin relationship of a response to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response.
    Cors,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(ResponseType::Basic),
            "cors" => Some(ResponseType::Cors),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully buffered response.
///
/// The body is a shared `Bytes` buffer, so `duplicate` gives the cache writer
/// its own copy without consuming the one handed back to the page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub redirected: bool,
}

impl FetchResponse {
    /// A same-origin, non-redirected response.
    pub fn basic(url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Status is exactly 200.
    pub fn is_clean_ok(&self) -> bool {
        self.status.as_u16() == NetworkConfig::CACHEABLE_STATUS
    }

    /// Plain same-origin 200 that was not redirected.
    pub fn is_cacheable_asset(&self) -> bool {
        self.is_clean_ok() && self.response_type == ResponseType::Basic && !self.redirected
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_descriptor_cacheability() {
        assert!(RequestDescriptor::get(url("/")).is_cacheable());
        assert!(!RequestDescriptor::new(Method::POST, url("/api/standards")).is_cacheable());
        assert!(!RequestDescriptor::new(Method::HEAD, url("/")).is_cacheable());
    }

    #[test]
    fn test_cache_key_includes_query() {
        let descriptor = RequestDescriptor::get(url("/api/standards?page=2"));
        assert_eq!(
            descriptor.cache_key(),
            "GET http://localhost:8080/api/standards?page=2"
        );
    }

    #[test]
    fn test_duplicate_is_independent_and_equal() {
        let original = FetchResponse::basic(url("/a.js"), StatusCode::OK, "console.log(1)");
        let copy = original.duplicate();
        drop(original);
        assert_eq!(copy.body, Bytes::from_static(b"console.log(1)"));
    }

    #[test]
    fn test_asset_cacheability() {
        let ok = FetchResponse::basic(url("/a.js"), StatusCode::OK, "x");
        assert!(ok.is_cacheable_asset());

        let created = FetchResponse::basic(url("/a.js"), StatusCode::CREATED, "x");
        assert!(created.is_ok());
        assert!(!created.is_cacheable_asset());

        let mut cross = ok.clone();
        cross.response_type = ResponseType::Cors;
        assert!(!cross.is_cacheable_asset());

        let mut redirected = ok.clone();
        redirected.redirected = true;
        assert!(!redirected.is_cacheable_asset());
    }

    #[test]
    fn test_response_type_roundtrip() {
        for kind in [ResponseType::Basic, ResponseType::Cors] {
            assert_eq!(ResponseType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResponseType::parse("opaque"), None);
    }
}
