//! Router discovery.
//!
//! # Data Flow
//! ```text
//! ScanConfig + root
//!     → resolver.rs (search plan, glob expansion)
//!     → per file, on the blocking pool:
//!         compiler.rs  → CompiledModule
//!         loader.rs    → LoadedModule (default export)
//!         validator.rs → accepted / rejected elements
//!     → registry.rs (routes with provenance, counters, issues)
//!     → ScanResult
//! events.rs notifies observers along the way.
//! ```
//!
//! # Design Decisions
//! - Files are processed one at a time, in discovery order, so the route
//!   order is reproducible
//! - Bad input never fails a scan: every problem becomes a [`ScanIssue`];
//!   only a crashed worker yields [`ScanError`]
//! - Observers fire from the async task, never from the worker
//! - Scans sharing a [`ScriptRuntime`] must not overlap: bundled helper
//!   modules are registered in the shared module registry

pub mod compiler;
pub mod error;
pub mod events;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod validator;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub use compiler::{
    compiler_for, ArtifactCompiler, CompilationArtifact, CompiledModule, ScopedCompiler,
    ScopedModule, SourceCompiler, TargetFormat,
};
pub use error::{CompileError, InvalidExport, LoadError, RejectReason, ScanError, ScanIssue};
pub use events::{EventBus, ScanCallbacks, ScanObserver};
pub use loader::{LoadedModule, ModuleLoader};
pub use registry::{RouteRegistry, ScanResult, ScanStats};
pub use resolver::{SearchPlan, SearchStep, SearchTask};
pub use validator::{ElementOutcome, RouteDeclaration, Validator};

use crate::config::{CompilerConfig, ScanConfig};
use crate::script::ScriptRuntime;

/// Compile, load and validate stages shared by every scan.
#[derive(Clone)]
pub struct Pipeline {
    compiler: Arc<dyn SourceCompiler>,
    loader: ModuleLoader,
    validator: Validator,
}

impl Pipeline {
    /// Pipeline using the configured compile strategy.
    pub fn new(runtime: &ScriptRuntime, config: &CompilerConfig) -> Self {
        Self::with_compiler(runtime, compiler_for(runtime, config))
    }

    /// Pipeline with a custom compiler.
    pub fn with_compiler(runtime: &ScriptRuntime, compiler: Arc<dyn SourceCompiler>) -> Self {
        Self {
            compiler,
            loader: ModuleLoader::new(runtime.engine().clone()),
            validator: Validator::new(runtime.engine().clone()),
        }
    }

    /// Run all three stages for one file.
    pub fn process(&self, file: &Path) -> Result<Vec<ElementOutcome>, ScanIssue> {
        let compiled = self.compiler.compile(file)?;
        let loaded = self.loader.load(compiled)?;
        Ok(self.validator.validate(&loaded)?)
    }
}

/// Discovers router scripts and turns them into route definitions.
#[derive(Clone)]
pub struct Scanner {
    pipeline: Pipeline,
    root: PathBuf,
    label: Option<String>,
    events: EventBus,
}

fn absolute(root: PathBuf) -> PathBuf {
    if root.is_absolute() {
        return root;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&root))
        .unwrap_or(root)
}

/// `path` with `.` and `..` applied lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// `path` relative to `base`, climbing out with `..` where needed. Paths on
/// another root or drive are returned unchanged.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);
    if path.components().next() != base.components().next() {
        return path;
    }

    let mut path_parts = path.components().peekable();
    let mut base_parts = base.components().peekable();
    while matches!((path_parts.peek(), base_parts.peek()), (Some(a), Some(b)) if a == b) {
        path_parts.next();
        base_parts.next();
    }

    let mut relative: PathBuf = base_parts.map(|_| Component::ParentDir).collect();
    relative.extend(path_parts);
    relative
}

impl Scanner {
    /// Scanner resolving relative scan paths against `root`.
    pub fn new(pipeline: Pipeline, root: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            root: absolute(root.into()),
            label: None,
            events: EventBus::new(),
        }
    }

    /// Label recorded in the provenance of every discovered route.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.events.subscribe(observer);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Scan every configured directory with every pattern.
    pub async fn scan(&self, config: &ScanConfig) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let plan = resolver::plan(config, &self.root);
        let mut registry = RouteRegistry::new(self.label.clone());

        tracing::debug!(
            root = %self.root.display(),
            dirs = plan.dirs.len(),
            label = ?self.label,
            "Scanning for router scripts"
        );
        self.events.start(&plan.dirs);

        for step in plan.steps {
            match step {
                SearchStep::MissingDir(dir) => {
                    tracing::warn!(path = %dir.display(), "Router path does not exist, skipping");
                    registry.record_issue(ScanIssue::PathNotFound { path: dir });
                }
                SearchStep::Search(task) => self.search(task, &mut registry).await?,
            }
        }

        let result = registry.finish();
        let stats = result.stats();
        tracing::info!(
            label = ?self.label,
            files = stats.files_scanned,
            routes = stats.routes_accepted,
            rejected = stats.routes_rejected,
            errors = stats.errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Router scan complete"
        );
        self.events.complete(result.routes(), &stats);
        Ok(result)
    }

    async fn search(&self, task: SearchTask, registry: &mut RouteRegistry) -> Result<(), ScanError> {
        let files = match resolver::expand(&task) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    dir = %task.dir.display(),
                    pattern = %task.pattern,
                    error = %e,
                    "Pattern matching failed, skipping"
                );
                registry.record_issue(ScanIssue::PatternMatchFailure {
                    dir: task.dir,
                    pattern: task.pattern,
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        if files.is_empty() {
            tracing::warn!(
                dir = %task.dir.display(),
                pattern = %task.pattern,
                "No router files matched"
            );
        }
        for file in files {
            self.scan_file(file, registry).await?;
        }
        Ok(())
    }

    async fn scan_file(&self, file: PathBuf, registry: &mut RouteRegistry) -> Result<(), ScanError> {
        let relative = relative_to(&file, &self.root);
        registry.record_file();
        self.events.file(&relative);

        let pipeline = self.pipeline.clone();
        let worker_file = file.clone();
        let outcome = tokio::task::spawn_blocking(move || pipeline.process(&worker_file))
            .await
            .map_err(|e| ScanError::Internal {
                file: file.clone(),
                message: e.to_string(),
            })?;

        let outcomes = match outcome {
            Ok(outcomes) => outcomes,
            Err(issue) => {
                tracing::warn!(file = %relative.display(), error = %issue, "Skipping router file");
                if matches!(issue, ScanIssue::Compile(_) | ScanIssue::Load(_)) {
                    self.events.error(&file, &issue);
                }
                registry.record_issue(issue);
                return Ok(());
            }
        };

        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                ElementOutcome::Accepted(route) => {
                    let route = registry.accept(&file, route);
                    tracing::debug!(
                        method = %route.method,
                        path = %route.path,
                        file = %relative.display(),
                        "Discovered route"
                    );
                    self.events.route(route);
                }
                ElementOutcome::Rejected(reason) => {
                    tracing::warn!(
                        file = %relative.display(),
                        index,
                        reason = %reason,
                        "Invalid route definition, skipping"
                    );
                    registry.record_issue(ScanIssue::InvalidRouteElement {
                        file: file.clone(),
                        index,
                        reason,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_inside_root() {
        assert_eq!(
            relative_to(Path::new("/srv/app/server/a.router.rhai"), Path::new("/srv/app")),
            PathBuf::from("server/a.router.rhai")
        );
    }

    #[test]
    fn test_relative_path_outside_root_climbs_out() {
        assert_eq!(
            relative_to(Path::new("/srv/app/../shared/b.router.rhai"), Path::new("/srv/app")),
            PathBuf::from("../shared/b.router.rhai")
        );
        assert_eq!(
            relative_to(Path::new("/opt/routes/c.router.rhai"), Path::new("/srv/app")),
            PathBuf::from("../../opt/routes/c.router.rhai")
        );
    }
}
