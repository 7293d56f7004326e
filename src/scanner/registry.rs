//! Accumulation of scan results.

use std::path::Path;

use serde::Serialize;

use crate::routing::{Provenance, RouteDefinition};
use crate::scanner::error::ScanIssue;
use crate::scanner::validator::RouteDeclaration;

/// Counters reported at the end of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub routes_accepted: usize,
    pub routes_rejected: usize,
    /// File-level failures (compile, load, export, pattern).
    pub errors: usize,
}

/// Everything one scan produced.
#[derive(Debug, Default)]
pub struct ScanResult {
    routes: Vec<RouteDefinition>,
    stats: ScanStats,
    issues: Vec<ScanIssue>,
}

impl ScanResult {
    /// Accepted routes in discovery order.
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn into_routes(self) -> Vec<RouteDefinition> {
        self.routes
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn issues(&self) -> &[ScanIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects routes and issues while a scan runs.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    label: Option<String>,
    result: ScanResult,
}

impl RouteRegistry {
    pub fn new(label: Option<String>) -> Self {
        Self {
            label,
            result: ScanResult::default(),
        }
    }

    pub fn record_file(&mut self) {
        self.result.stats.files_scanned += 1;
    }

    /// Store an accepted route with its provenance.
    pub fn accept(&mut self, file: &Path, route: RouteDeclaration) -> &RouteDefinition {
        self.result.stats.routes_accepted += 1;
        self.result.routes.push(RouteDefinition {
            path: route.path,
            method: route.method,
            handler: route.handler,
            description: route.description,
            provenance: Provenance::new(file, self.label.clone()),
        });
        &self.result.routes[self.result.routes.len() - 1]
    }

    pub fn record_issue(&mut self, issue: ScanIssue) {
        if matches!(issue, ScanIssue::InvalidRouteElement { .. }) {
            self.result.stats.routes_rejected += 1;
        } else if issue.is_error() {
            self.result.stats.errors += 1;
        }
        self.result.issues.push(issue);
    }

    pub fn finish(self) -> ScanResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::http::{ApiRequest, ApiResponse};
    use crate::routing::{FnHandler, HandlerError, RouteMethod};
    use crate::scanner::error::{InvalidExport, RejectReason};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn noop(
        _: ApiRequest,
        _: ApiResponse,
        _: &SharedContext,
    ) -> Result<Option<Value>, HandlerError> {
        Ok(None)
    }

    fn declaration(path: &str) -> RouteDeclaration {
        RouteDeclaration {
            path: path.into(),
            method: RouteMethod::Get,
            handler: Arc::new(FnHandler(noop)),
            description: None,
        }
    }

    #[test]
    fn test_counters_follow_recorded_events() {
        let mut registry = RouteRegistry::new(Some("users".into()));
        let file = PathBuf::from("/srv/users.router.rhai");

        registry.record_file();
        registry.accept(&file, declaration("/a"));
        registry.record_issue(ScanIssue::InvalidRouteElement {
            file: file.clone(),
            index: 1,
            reason: RejectReason::MissingField("path"),
        });
        registry.record_issue(ScanIssue::PathNotFound {
            path: PathBuf::from("/srv/missing"),
        });
        registry.record_issue(InvalidExport::Missing { path: file.clone() }.into());

        let result = registry.finish();
        assert_eq!(
            result.stats(),
            ScanStats {
                files_scanned: 1,
                routes_accepted: 1,
                routes_rejected: 1,
                errors: 1,
            }
        );
        assert_eq!(result.issues().len(), 3);
        assert_eq!(result.routes()[0].provenance.module_label.as_deref(), Some("users"));
        assert_eq!(result.routes()[0].provenance.source_file(), file.as_path());
    }
}
