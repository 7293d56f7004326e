//! Route table bookkeeping for introspection and the startup banner.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A mounted route as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub method: String,
    /// Full path including prefix and module base.
    pub path: String,
    pub module: String,
    pub description: Option<String>,
}

/// Collects mounted routes in registration order.
#[derive(Debug, Default, Clone)]
pub struct RouteCollector {
    routes: Vec<RouteInfo>,
}

impl RouteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        module: impl Into<String>,
        description: Option<String>,
    ) {
        self.routes.push(RouteInfo {
            method: method.into(),
            path: path.into(),
            module: module.into(),
            description,
        });
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes grouped by module, groups in first-seen order.
    pub fn grouped(&self) -> IndexMap<&str, Vec<&RouteInfo>> {
        let mut groups: IndexMap<&str, Vec<&RouteInfo>> = IndexMap::new();
        for route in &self.routes {
            groups.entry(route.module.as_str()).or_default().push(route);
        }
        groups
    }

    /// Log the route table, one line per route.
    pub fn print_routes(&self) {
        if self.routes.is_empty() {
            tracing::info!("No routes registered");
            return;
        }

        for (module, routes) in self.grouped() {
            tracing::info!(module = %module, count = routes.len(), "Route module");
            for route in routes {
                match &route.description {
                    Some(description) => tracing::info!(
                        "  {:<7} {} - {}",
                        route.method,
                        route.path,
                        description
                    ),
                    None => tracing::info!("  {:<7} {}", route.method, route.path),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_keeps_first_seen_order() {
        let mut collector = RouteCollector::new();
        collector.add("GET", "/api/test", "builtin", None);
        collector.add("GET", "/api/users", "users", Some("List users".into()));
        collector.add("GET", "/api/routes", "builtin", None);

        let groups = collector.grouped();
        let modules: Vec<&str> = groups.keys().copied().collect();
        assert_eq!(modules, vec!["builtin", "users"]);
        assert_eq!(groups["builtin"].len(), 2);
        assert_eq!(collector.len(), 3);
    }
}
