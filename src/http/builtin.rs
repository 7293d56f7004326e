//! Routes compiled into the server.
//!
//! - `GET /test`: liveness, raw JSON
//! - `GET /advance-api-test`: status and server information
//! - `GET /routes`: the mounted route table
//!
//! They are mounted before scanned routes, so a router script cannot
//! shadow them.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};

use crate::context::SharedContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::routing::{FnHandler, HandlerError, Provenance, RouteDefinition, RouteMethod};

/// Host details reported by `/advance-api-test`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub hostname: String,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpus: usize,
    pub version: &'static str,
    pub started_at_ms: u64,
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ServerInfo {
    pub fn collect() -> Self {
        Self {
            hostname: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            version: env!("CARGO_PKG_VERSION"),
            started_at_ms: epoch_ms(),
        }
    }
}

fn builtin(
    path: &str,
    description: &str,
    handler: impl Fn(ApiRequest, ApiResponse, &SharedContext) -> Result<Option<Value>, HandlerError>
        + Send
        + Sync
        + 'static,
) -> RouteDefinition {
    RouteDefinition {
        path: path.to_string(),
        method: RouteMethod::Get,
        handler: Arc::new(FnHandler(handler)),
        description: Some(description.to_string()),
        provenance: Provenance::builtin(),
    }
}

/// The built-in route set.
pub fn builtin_routes(info: ServerInfo) -> Vec<RouteDefinition> {
    let info = serde_json::to_value(&info).unwrap_or(Value::Null);

    vec![
        builtin("/test", "Liveness check", |_req, res, _ctx| {
            res.json(json!({
                "status": "ok",
                "message": "API server is working",
                "timestamp": epoch_ms(),
            }));
            Ok(None)
        }),
        builtin(
            "/advance-api-test",
            "Check that the API is working",
            move |_req, res, _ctx| {
                res.success(json!({
                    "status": "ok",
                    "time": epoch_ms(),
                    "version": env!("CARGO_PKG_VERSION"),
                    "message": "Advance API is working!",
                    "serverInfo": info,
                }));
                Ok(None)
            },
        ),
        builtin("/routes", "List mounted routes", |_req, _res, ctx| {
            let routes = serde_json::to_value(ctx.routes().as_ref())
                .map_err(|e| HandlerError::Context(e.to_string()))?;
            Ok(Some(routes))
        }),
    ]
}
