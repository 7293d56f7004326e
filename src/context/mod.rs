//! Shared context passed to every route handler.
//!
//! # Data Flow
//! ```text
//! startup
//!     → database.rs (optional handle)
//!     → SharedContext::new (db + HTTP client)
//!     → scanner runs, handlers capture nothing but receive the context
//!     → mounting publishes the final route table into the context
//! ```
//!
//! # Design Decisions
//! - The database handle travels inside the context, never in a global
//! - The route table is swapped in atomically once mounting completes

pub mod database;

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

pub use database::{init_database, Database, DatabaseConfig, DatabaseError, DatabaseKind};

use crate::routing::{HandlerError, RouteInfo};

/// Reply from [`SharedContext::fetch`].
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    /// JSON when the body parses as JSON, a string otherwise.
    pub body: Value,
}

struct ContextInner {
    db: Option<Database>,
    http: reqwest::Client,
    routes: ArcSwap<Vec<RouteInfo>>,
}

/// Dependency bag handed to handlers as their third argument.
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("db", &self.inner.db.is_some())
            .field("routes", &self.inner.routes.load().len())
            .finish()
    }
}

impl SharedContext {
    pub fn new(db: Option<Database>) -> Self {
        Self::with_client(db, reqwest::Client::new())
    }

    pub fn with_client(db: Option<Database>, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                db,
                http,
                routes: ArcSwap::from_pointee(Vec::new()),
            }),
        }
    }

    pub fn db(&self) -> Option<&Database> {
        self.inner.db.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Fresh UUID v4 string.
    pub fn uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Mounted routes; empty until startup finishes mounting.
    pub fn routes(&self) -> Arc<Vec<RouteInfo>> {
        self.inner.routes.load_full()
    }

    pub fn publish_routes(&self, routes: Vec<RouteInfo>) {
        self.inner.routes.store(Arc::new(routes));
    }

    /// Blocking HTTP call for synchronous handlers.
    ///
    /// Must run on a thread that belongs to a Tokio runtime but is allowed
    /// to block (handlers run on the blocking pool).
    pub fn fetch(&self, method: &str, url: &str, body: Option<Value>) -> Result<HttpReply, HandlerError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| HandlerError::Context("no async runtime available for HTTP".into()))?;
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| HandlerError::Context(format!("invalid HTTP method `{}`", method)))?;

        let mut request = self.inner.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        handle.block_on(async move {
            let response = request
                .send()
                .await
                .map_err(|e| HandlerError::Context(format!("HTTP request failed: {}", e)))?;
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .map_err(|e| HandlerError::Context(format!("failed to read HTTP body: {}", e)))?;
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            Ok(HttpReply { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table_is_published() {
        let ctx = SharedContext::new(None);
        assert!(ctx.routes().is_empty());

        ctx.publish_routes(vec![RouteInfo {
            method: "GET".into(),
            path: "/api/test".into(),
            module: "builtin".into(),
            description: None,
        }]);
        assert_eq!(ctx.routes().len(), 1);
        assert!(ctx.db().is_none());
    }

    #[test]
    fn test_uuid_is_unique() {
        let ctx = SharedContext::new(Some(Database::memory()));
        assert_ne!(ctx.uuid(), ctx.uuid());
        assert!(ctx.db().is_some());
    }
}
