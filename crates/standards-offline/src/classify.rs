//! Decides whether the cache takes part in a request, and how.

use crate::message::FetchRequest;
use reqwest::Method;
use serde::Serialize;

/// Handling chosen for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Not a `GET`: goes straight to the network, never touches a bucket.
    Passthrough,
    /// Data endpoint: live data first, stored snapshot when offline.
    NetworkFirst,
    /// Static asset: stored copy first, network only on a miss.
    CacheFirst,
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestClass::Passthrough => write!(f, "passthrough"),
            RequestClass::NetworkFirst => write!(f, "network-first"),
            RequestClass::CacheFirst => write!(f, "cache-first"),
        }
    }
}

/// Classify `request`. `api_prefix` is matched anywhere in the full URL.
pub fn classify(request: &FetchRequest, api_prefix: &str) -> RequestClass {
    if request.method != Method::GET {
        RequestClass::Passthrough
    } else if request.url.as_str().contains(api_prefix) {
        RequestClass::NetworkFirst
    } else {
        RequestClass::CacheFirst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn request(method: Method, path: &str) -> FetchRequest {
        let url = Url::parse("http://localhost:8080").unwrap().join(path).unwrap();
        FetchRequest::new(method, url)
    }

    #[test]
    fn test_mutations_pass_through() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            assert_eq!(
                classify(&request(method, "/api/user/standards"), "/api/"),
                RequestClass::Passthrough
            );
        }
        assert_eq!(
            classify(&request(Method::HEAD, "/static/js/app.js"), "/api/"),
            RequestClass::Passthrough
        );
    }

    #[test]
    fn test_api_reads_are_network_first() {
        assert_eq!(
            classify(&request(Method::GET, "/api/standards?search=blue"), "/api/"),
            RequestClass::NetworkFirst
        );
        assert_eq!(
            classify(&request(Method::GET, "/api/categories"), "/api/"),
            RequestClass::NetworkFirst
        );
    }

    #[test]
    fn test_everything_else_is_cache_first() {
        for path in ["/", "/static/css/styles.css", "/manifest.json", "/api"] {
            assert_eq!(
                classify(&request(Method::GET, path), "/api/"),
                RequestClass::CacheFirst,
                "{path}"
            );
        }
    }

    #[test]
    fn test_prefix_matches_anywhere_in_url() {
        // Substring semantics: a query string mentioning the prefix counts too
        assert_eq!(
            classify(&request(Method::GET, "/static/docs.html?from=/api/"), "/api/"),
            RequestClass::NetworkFirst
        );
    }
}
