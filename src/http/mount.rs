//! Binding route definitions to the HTTP router.
//!
//! # Responsibilities
//! - Mount each route at `join(prefix, base, path)` for its method
//! - Skip duplicate (shape, method) pairs, first registration wins
//! - Dispatch requests to handlers on the blocking pool
//! - Record every mounted route for introspection
//!
//! # Design Decisions
//! - Routes that only differ in parameter names share one router entry;
//!   each handler still extracts parameters with its own names
//! - An uncommitted response after a handler returns is sent as a success
//!   envelope carrying the returned value
//! - Handler errors and panics become a 500 error envelope

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::MethodRouter,
    Router,
};
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::SharedContext;
use crate::http::request::ApiRequest;
use crate::http::response::{error_response, ApiResponse};
use crate::routing::path::{join_paths, route_shape, to_router_path};
use crate::routing::{Handler, RouteCollector, RouteDefinition, RouteInfo, RouteMethod};

/// Routes sharing one matching shape.
struct RouteGroup {
    router_path: String,
    methods: MethodRouter,
    routes: Vec<RouteInfo>,
}

/// Accumulates routes, then produces the router and the route table.
pub struct Mounter {
    prefix: String,
    body_limit: usize,
    context: SharedContext,
    groups: IndexMap<String, RouteGroup>,
    seen: HashSet<(String, RouteMethod)>,
}

async fn dispatch(
    handler: Arc<dyn Handler>,
    context: SharedContext,
    request: Request<Body>,
    pattern: Arc<str>,
    body_limit: usize,
) -> Response {
    let request = match ApiRequest::from_http(request, &pattern, body_limit).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    let request_id = request.id.clone();

    let response = ApiResponse::new();
    let writer = response.clone();
    let outcome =
        tokio::task::spawn_blocking(move || handler.call(request, writer, &context)).await;

    match outcome {
        Ok(Ok(value)) => {
            if !response.is_committed() {
                response.success(value.unwrap_or(Value::Null));
            }
            response.into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, route = %pattern, error = %e, "Handler failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, route = %pattern, error = %e, "Handler panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

impl Mounter {
    pub fn new(prefix: impl Into<String>, context: SharedContext, body_limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            body_limit,
            context,
            groups: IndexMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Mount `routes` under `base`. Returns how many were mounted.
    pub fn mount(&mut self, base: &str, routes: &[RouteDefinition]) -> usize {
        routes
            .iter()
            .filter(|route| self.mount_route(base, route))
            .count()
    }

    /// Mount one route. Returns false when an earlier route already owns
    /// its path and method.
    pub fn mount_route(&mut self, base: &str, route: &RouteDefinition) -> bool {
        let full = join_paths(&[&self.prefix, base, &route.path]);
        let shape = route_shape(&full);

        if !self.seen.insert((shape.clone(), route.method)) {
            tracing::warn!(
                method = %route.method,
                path = %full,
                source = %route.provenance.source_file().display(),
                "Route already registered, skipping duplicate"
            );
            return false;
        }

        let handler = route.handler.clone();
        let context = self.context.clone();
        let pattern: Arc<str> = Arc::from(full.as_str());
        let body_limit = self.body_limit;
        let endpoint = move |request: Request<Body>| {
            dispatch(handler.clone(), context.clone(), request, pattern.clone(), body_limit)
        };

        let group = self.groups.entry(shape).or_insert_with(|| RouteGroup {
            router_path: to_router_path(&full),
            methods: MethodRouter::new(),
            routes: Vec::new(),
        });
        let methods = std::mem::replace(&mut group.methods, MethodRouter::new());
        group.methods = methods.on(route.method.filter(), endpoint);
        group.routes.push(RouteInfo {
            method: route.method.to_string(),
            path: full,
            module: route
                .provenance
                .module_label
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            description: route.description.clone(),
        });
        true
    }

    /// Build the router. Entries the router rejects are logged and dropped.
    pub fn into_router(self) -> (Router, RouteCollector) {
        let mut router = Router::new();
        let mut collector = RouteCollector::new();

        for (_, group) in self.groups {
            let RouteGroup {
                router_path,
                methods,
                routes,
            } = group;
            let candidate = router.clone();
            let path = router_path.clone();
            match catch_unwind(AssertUnwindSafe(move || candidate.route(&path, methods))) {
                Ok(next) => {
                    router = next;
                    for info in routes {
                        collector.add(info.method, info.path, info.module, info.description);
                    }
                }
                Err(_) => {
                    tracing::warn!(path = %router_path, "Route conflicts with a mounted route, skipping");
                }
            }
        }

        (router, collector)
    }
}
