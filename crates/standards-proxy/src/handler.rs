//! Request handlers: control endpoints and the intercepting proxy.

use crate::server::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use standards_offline::network::strip_hop_by_hop;
use standards_offline::{FetchRequest, FetchResponse};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Largest request body forwarded to the origin.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Worker state, connectivity and store usage.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    match state.worker.status().await {
        Ok(status) => Json(json!({
            "origin": state.worker.origin().as_str(),
            "worker": status,
            "connectivity": state.connectivity.snapshot(),
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to read worker status: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Deliver an incoming request to the worker as a fetch event.
pub async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let fetch = match into_fetch_request(state.worker.origin(), request).await {
        Ok(fetch) => fetch,
        Err(message) => {
            warn!("Rejected request: {}", message);
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    let method = fetch.method.clone();
    let url = fetch.url.clone();
    match state.worker.respond(fetch).await {
        Ok(response) => {
            debug!("{} {} -> {}", method, url, response.status);
            into_http_response(response)
        }
        Err(e) => {
            warn!("{} {} failed: {}", method, url, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Rebase the request onto the origin and buffer its body.
async fn into_fetch_request(origin: &Url, request: Request) -> Result<FetchRequest, String> {
    let (parts, body) = request.into_parts();

    // Only path and query come from the request; scheme and host stay the origin's
    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let body: Bytes = to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| format!("Failed to read request body: {}", e))?;

    Ok(FetchRequest::new(parts.method, url)
        .with_headers(strip_hop_by_hop(&parts.headers))
        .with_body(body))
}

fn into_http_response(response: FetchResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = strip_hop_by_hop(&response.headers);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method};
    use reqwest::header::{CONNECTION, CONTENT_TYPE};

    #[tokio::test]
    async fn test_request_rebased_onto_origin() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/user/standards?draft=1")
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "keep-alive")
            .body(Body::from(r#"{"title":"Giant Steps"}"#))
            .unwrap();

        let fetch = into_fetch_request(&origin, request).await.unwrap();

        assert_eq!(fetch.method, Method::POST);
        assert_eq!(
            fetch.url.as_str(),
            "http://localhost:8080/api/user/standards?draft=1"
        );
        assert_eq!(fetch.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(fetch.headers.get(CONNECTION).is_none());
        assert_eq!(fetch.body.as_ref(), br#"{"title":"Giant Steps"}"#);
    }

    #[tokio::test]
    async fn test_scheme_relative_target_stays_on_origin() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let request = Request::builder()
            .uri("//example.com/static/x.js")
            .body(Body::empty())
            .unwrap();

        let fetch = into_fetch_request(&origin, request).await.unwrap();

        assert_eq!(fetch.url.host_str(), Some("localhost"));
        assert_eq!(fetch.url.port(), Some(8080));
        assert_eq!(fetch.url.path(), "//example.com/static/x.js");
    }

    #[tokio::test]
    async fn test_response_keeps_status_and_headers() {
        let url = Url::parse("http://localhost:8080/manifest.json").unwrap();
        let mut response = FetchResponse::basic(url, StatusCode::OK, "{}");
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
            .headers
            .insert(CONNECTION, HeaderValue::from_static("close"));

        let out = into_http_response(response);

        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(out.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(out.headers().get(CONNECTION).is_none());
        let body = to_bytes(out.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"{}");
    }
}
