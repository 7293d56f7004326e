//! Request handling.
//!
//! # Responsibilities
//! - Turn an HTTP request into the plain [`ApiRequest`] handlers receive
//! - Expose the request ID assigned by the request-id layer
//! - Request logging middleware (`logger = true`)

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use axum::{
    body::Body,
    extract::Query,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::http::response::error_response;
use crate::observability::metrics;
use crate::routing::path::match_params;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request data passed to handlers.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub id: String,
    pub method: String,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, the raw text for non-JSON bodies, or null.
    pub body: Value,
}

impl ApiRequest {
    /// Read `request` fully. `pattern` is the declared route path used to
    /// extract path parameters.
    pub async fn from_http(
        request: Request<Body>,
        pattern: &str,
        body_limit: usize,
    ) -> Result<Self, Response> {
        let (parts, body) = request.into_parts();

        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q.into_iter().collect())
            .unwrap_or_default();

        let headers: BTreeMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let is_json = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let bytes = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(|_| error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"))?;

        let body = if bytes.is_empty() {
            Value::Null
        } else if is_json {
            serde_json::from_slice(&bytes).map_err(|e| {
                error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
            })?
        } else {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        };

        let path = parts.uri.path().to_string();
        Ok(Self {
            id: headers.get(X_REQUEST_ID).cloned().unwrap_or_default(),
            method: parts.method.to_string(),
            params: match_params(pattern, &path),
            path,
            query,
            headers,
            body,
        })
    }
}

/// Log one line per request and record request metrics.
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    tracing::info!(
        "[API] {} {} {} {}ms",
        method,
        uri,
        status,
        start.elapsed().as_millis()
    );
    metrics::record_request(&method, status, start);
    response
}
