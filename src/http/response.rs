//! Response helper handed to every route handler.
//!
//! # Responsibilities
//! - `success(data)` / `error(message, code)` JSON envelopes
//! - Lower-level `status`, `header`, `json`, `send` for custom replies
//! - Convert whatever the handler produced into an HTTP response
//!
//! # Design Decisions
//! - The helper is a cheap clone over shared state so script handlers can
//!   pass it around by value
//! - The first terminating call wins; later ones are logged and ignored

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform JSON body used by the convenience methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub data: Value,
    pub message: String,
    pub success: bool,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self::success_with(data, "success")
    }

    pub fn success_with(data: Value, message: impl Into<String>) -> Self {
        Self {
            code: 200,
            data,
            message: message.into(),
            success: true,
        }
    }

    pub fn failure(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            data: Value::Null,
            message: message.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Body {
    Json(Value),
    Text(String),
    Html(String),
}

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Option<Body>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Handler-facing response builder.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl ApiResponse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        // A handler panicking mid-write leaves the state usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(&self, status: Option<StatusCode>, body: Body) {
        let mut state = self.lock();
        if state.body.is_some() {
            tracing::warn!("Response already sent, ignoring second write");
            return;
        }
        if let Some(status) = status {
            state.status = status;
        }
        state.body = Some(body);
    }

    /// 200 with `{ code: 200, data, message: "success", success: true }`.
    pub fn success(&self, data: Value) {
        self.send_envelope(Envelope::success(data));
    }

    pub fn success_with(&self, data: Value, message: impl Into<String>) {
        self.send_envelope(Envelope::success_with(data, message));
    }

    /// `{ code, data: null, message, success: false }` with `code` as status.
    pub fn error(&self, message: impl Into<String>, code: u16) {
        self.send_envelope(Envelope::failure(code, message));
    }

    /// 401 error envelope.
    pub fn denied(&self, message: impl Into<String>) {
        self.error(message, StatusCode::UNAUTHORIZED.as_u16());
    }

    /// Codes outside 100..=599 are sent, and reported, as 500.
    fn send_envelope(&self, mut envelope: Envelope) {
        let status = StatusCode::from_u16(envelope.code)
            .ok()
            .filter(|s| s.as_u16() < 600)
            .unwrap_or_else(|| {
                tracing::warn!(code = envelope.code, "Invalid envelope code, sending 500");
                StatusCode::INTERNAL_SERVER_ERROR
            });
        envelope.code = status.as_u16();
        let body = serde_json::to_value(&envelope).unwrap_or(Value::Null);
        self.commit(Some(status), Body::Json(body));
    }

    /// Set the status used by the next `json` / `send`.
    pub fn status(&self, code: u16) -> &Self {
        match StatusCode::from_u16(code) {
            Ok(status) => self.lock().status = status,
            Err(_) => tracing::warn!(code, "Ignoring invalid status code"),
        }
        self
    }

    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.lock().headers.push((name.into(), value.into()));
        self
    }

    /// Raw JSON body, no envelope.
    pub fn json(&self, value: Value) {
        self.commit(None, Body::Json(value));
    }

    /// Plain text body; sent as HTML when it looks like a document.
    pub fn send(&self, text: impl Into<String>) {
        let text = text.into();
        let trimmed = text.trim_start();
        let body = if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") {
            Body::Html(text)
        } else {
            Body::Text(text)
        };
        self.commit(None, body);
    }

    /// Whether a terminating method has been called.
    pub fn is_committed(&self) -> bool {
        self.lock().body.is_some()
    }

    pub fn current_status(&self) -> u16 {
        self.lock().status.as_u16()
    }

    /// Build the HTTP response. Uncommitted responses become an empty body.
    pub fn into_response(self) -> Response {
        let state = std::mem::take(&mut *self.lock());
        let mut response = match state.body {
            Some(Body::Json(value)) => Json(value).into_response(),
            Some(Body::Text(text)) => text.into_response(),
            Some(Body::Html(html)) => Html(html).into_response(),
            None => ().into_response(),
        };
        *response.status_mut() = state.status;

        for (name, value) in state.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid response header"),
            }
        }

        response
    }
}

/// Standalone error envelope response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(Envelope::failure(status.as_u16(), message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let res = ApiResponse::new();
        res.success(json!({ "message": "Get users" }));

        let response = res.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "code": 200,
                "data": { "message": "Get users" },
                "message": "success",
                "success": true
            })
        );
    }

    #[tokio::test]
    async fn test_error_envelope_uses_code_as_status() {
        let res = ApiResponse::new();
        res.error("email already registered", 400);

        let response = res.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let res = ApiResponse::new();
        let alias = res.clone();
        res.success(json!(1));
        alias.error("late", 500);

        assert!(res.is_committed());
        let response = res.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"], 1);
    }

    #[tokio::test]
    async fn test_status_then_json() {
        let res = ApiResponse::new();
        res.status(201).header("x-created", "yes").json(json!({ "id": 1 }));

        let response = res.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-created"], "yes");
        assert_eq!(body_json(response).await, json!({ "id": 1 }));
    }

    #[tokio::test]
    async fn test_out_of_range_error_code_is_reported_as_sent() {
        for code in [999, 42, 600] {
            let res = ApiResponse::new();
            res.error("odd code", code);

            let response = res.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body = body_json(response).await;
            assert_eq!(body["code"], 500);
            assert_eq!(body["message"], "odd code");
        }
    }
}
