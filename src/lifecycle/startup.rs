//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order: database, shared context,
//!   script runtime
//! - Run the router scan and every module scan
//! - Mount built-in and discovered routes, publish the route table
//!
//! # Design Decisions
//! - Database failure is fatal only when the database is `required`
//! - A failed scan is logged and contributes no routes
//! - Built-ins are mounted first, then scans in config order, so the first
//!   declaration of a path + method wins
//! - Binding the listener is left to the caller

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ApiConfig, ScanConfig};
use crate::context::{init_database, Database, DatabaseError, SharedContext};
use crate::http::{builtin_routes, ApiServer, Mounter, ServerInfo};
use crate::observability::MetricsObserver;
use crate::routing::{RouteCollector, RouteDefinition};
use crate::scanner::{Pipeline, ScanResult, ScanStats, Scanner};
use crate::script::ScriptRuntime;

/// Fatal startup failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required database failed to initialize: {0}")]
    Database(#[from] DatabaseError),
}

/// Outcome of one scan, kept for reporting.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub label: Option<String>,
    pub base: String,
    pub stats: ScanStats,
}

/// Everything needed to serve.
pub struct Application {
    pub server: ApiServer,
    pub context: SharedContext,
    pub runtime: ScriptRuntime,
    pub routes: RouteCollector,
    pub scans: Vec<ScanSummary>,
}

fn connect_database(config: &ApiConfig) -> Result<Option<Database>, StartupError> {
    let Some(db_config) = &config.database else {
        return Ok(None);
    };
    match init_database(db_config) {
        Ok(db) => Ok(Some(db)),
        Err(e) if db_config.required => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Database unavailable, continuing without it");
            Ok(None)
        }
    }
}

async fn run_scan(scanner: &Scanner, scan: &ScanConfig) -> ScanResult {
    match scanner.scan(scan).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(
                label = ?scanner.label(),
                error = %e,
                "Router scan failed, continuing without its routes"
            );
            ScanResult::default()
        }
    }
}

/// Build the application from a validated config.
///
/// Relative scan paths resolve against each scan's `root`, or `base_dir`
/// when it has none.
pub async fn build_application(
    config: ApiConfig,
    base_dir: &Path,
) -> Result<Application, StartupError> {
    let db = connect_database(&config)?;
    let context = SharedContext::new(db);
    let runtime = ScriptRuntime::new(&config.compiler);
    let pipeline = Pipeline::new(&runtime, &config.compiler);
    let metrics: Arc<MetricsObserver> = Arc::new(MetricsObserver);

    let root_for = |root: &Option<PathBuf>| root.clone().unwrap_or_else(|| base_dir.to_path_buf());

    let mut discovered: Vec<(String, Vec<RouteDefinition>)> = Vec::new();
    let mut scans = Vec::new();

    if let Some(router_scan) = &config.router_scan {
        tracing::info!("Scanning router files");
        let scanner = Scanner::new(pipeline.clone(), root_for(&router_scan.root))
            .with_observer(metrics.clone());
        let result = run_scan(&scanner, &router_scan.scan).await;
        scans.push(ScanSummary {
            label: None,
            base: String::new(),
            stats: result.stats(),
        });
        discovered.push((String::new(), result.into_routes()));
    }

    for module in &config.modules {
        tracing::info!(module = %module.label, base = %module.base, "Scanning module");
        let scanner = Scanner::new(pipeline.clone(), root_for(&module.root))
            .with_label(module.label.clone())
            .with_observer(metrics.clone());
        let result = run_scan(&scanner, &module.scan).await;
        scans.push(ScanSummary {
            label: Some(module.label.clone()),
            base: module.base.clone(),
            stats: result.stats(),
        });
        discovered.push((module.base.clone(), result.into_routes()));
    }

    let mut mounter = Mounter::new(
        config.prefix.clone(),
        context.clone(),
        config.listener.max_body_size,
    );
    mounter.mount("", &builtin_routes(ServerInfo::collect()));
    for (base, routes) in &discovered {
        let mounted = mounter.mount(base, routes);
        if mounted < routes.len() {
            tracing::warn!(
                base = %base,
                skipped = routes.len() - mounted,
                "Some discovered routes were not mounted"
            );
        }
    }

    let (router, routes) = mounter.into_router();
    context.publish_routes(routes.routes().to_vec());
    routes.print_routes();

    let server = ApiServer::new(config, router);
    Ok(Application {
        server,
        context,
        runtime,
        routes,
        scans,
    })
}
