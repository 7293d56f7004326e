//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by method, status
//! - `api_request_duration_seconds` (histogram): latency by method
//! - `api_scan_files_total` (counter): router files visited
//! - `api_scan_routes_total` (counter): routes accepted, by method
//! - `api_scan_errors_total` (counter): file failures, by kind
//! - `api_routes_discovered` (gauge): routes found by the last scan
//! - `api_routes_rejected` (gauge): route elements rejected by the last scan
//!
//! # Design Decisions
//! - Without an installed recorder every update is a no-op
//! - The exporter is optional and only started from `main`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::routing::RouteDefinition;
use crate::scanner::{ScanIssue, ScanObserver, ScanStats};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one served request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("api_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

fn issue_kind(issue: &ScanIssue) -> &'static str {
    match issue {
        ScanIssue::PathNotFound { .. } => "path_not_found",
        ScanIssue::PatternMatchFailure { .. } => "pattern",
        ScanIssue::Compile(_) => "compile",
        ScanIssue::Load(_) => "load",
        ScanIssue::InvalidExport(_) => "export",
        ScanIssue::InvalidRouteElement { .. } => "element",
    }
}

/// Scan observer feeding the scan metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl ScanObserver for MetricsObserver {
    fn on_start(&self, _dirs: &[PathBuf]) {
        counter!("api_scans_total").increment(1);
    }

    fn on_file(&self, _relative: &Path) {
        counter!("api_scan_files_total").increment(1);
    }

    fn on_route(&self, route: &RouteDefinition) {
        counter!("api_scan_routes_total", "method" => route.method.as_str()).increment(1);
    }

    fn on_error(&self, _file: &Path, issue: &ScanIssue) {
        counter!("api_scan_errors_total", "kind" => issue_kind(issue)).increment(1);
    }

    fn on_complete(&self, routes: &[RouteDefinition], stats: &ScanStats) {
        gauge!("api_routes_discovered").set(routes.len() as f64);
        gauge!("api_routes_rejected").set(stats.routes_rejected as f64);
    }
}
