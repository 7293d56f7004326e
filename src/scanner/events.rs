//! Scan lifecycle notifications.
//!
//! Observers are isolated: a panicking observer is logged and the scan
//! carries on, and the remaining observers still see the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::routing::RouteDefinition;
use crate::scanner::error::ScanIssue;
use crate::scanner::registry::ScanStats;

/// Hooks fired while a scan runs. Every hook defaults to doing nothing.
pub trait ScanObserver: Send + Sync {
    /// Resolved base directories, before anything is searched.
    fn on_start(&self, _dirs: &[PathBuf]) {}

    /// A file matched; `relative` is relative to the scan root, climbing out
    /// with `..` for directories outside it.
    fn on_file(&self, _relative: &Path) {}

    /// A route was accepted.
    fn on_route(&self, _route: &RouteDefinition) {}

    /// A file failed to compile or load.
    fn on_error(&self, _file: &Path, _issue: &ScanIssue) {}

    /// The scan finished; `routes` is the final, ordered result.
    fn on_complete(&self, _routes: &[RouteDefinition], _stats: &ScanStats) {}
}

type StartHook = Box<dyn Fn(&[PathBuf]) + Send + Sync>;
type FileHook = Box<dyn Fn(&Path) + Send + Sync>;
type RouteHook = Box<dyn Fn(&RouteDefinition) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&Path, &ScanIssue) + Send + Sync>;
type CompleteHook = Box<dyn Fn(&[RouteDefinition], &ScanStats) + Send + Sync>;

/// Closure-based observer; unset hooks are skipped.
#[derive(Default)]
pub struct ScanCallbacks {
    start: Option<StartHook>,
    file: Option<FileHook>,
    route: Option<RouteHook>,
    error: Option<ErrorHook>,
    complete: Option<CompleteHook>,
}

impl ScanCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn(&[PathBuf]) + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    pub fn on_file(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.file = Some(Box::new(f));
        self
    }

    pub fn on_route(mut self, f: impl Fn(&RouteDefinition) + Send + Sync + 'static) -> Self {
        self.route = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&Path, &ScanIssue) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_complete(
        mut self,
        f: impl Fn(&[RouteDefinition], &ScanStats) + Send + Sync + 'static,
    ) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl ScanObserver for ScanCallbacks {
    fn on_start(&self, dirs: &[PathBuf]) {
        if let Some(f) = &self.start {
            f(dirs)
        }
    }

    fn on_file(&self, relative: &Path) {
        if let Some(f) = &self.file {
            f(relative)
        }
    }

    fn on_route(&self, route: &RouteDefinition) {
        if let Some(f) = &self.route {
            f(route)
        }
    }

    fn on_error(&self, file: &Path, issue: &ScanIssue) {
        if let Some(f) = &self.error {
            f(file, issue)
        }
    }

    fn on_complete(&self, routes: &[RouteDefinition], stats: &ScanStats) {
        if let Some(f) = &self.complete {
            f(routes, stats)
        }
    }
}

/// Fans events out to every registered observer.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn ScanObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ScanObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn emit(&self, event: &'static str, f: impl Fn(&dyn ScanObserver)) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                tracing::warn!(event, "Scan observer panicked, continuing");
            }
        }
    }

    pub fn start(&self, dirs: &[PathBuf]) {
        self.emit("start", |o| o.on_start(dirs));
    }

    pub fn file(&self, relative: &Path) {
        self.emit("file", |o| o.on_file(relative));
    }

    pub fn route(&self, route: &RouteDefinition) {
        self.emit("route", |o| o.on_route(route));
    }

    pub fn error(&self, file: &Path, issue: &ScanIssue) {
        self.emit("error", |o| o.on_error(file, issue));
    }

    pub fn complete(&self, routes: &[RouteDefinition], stats: &ScanStats) {
        self.emit("complete", |o| o.on_complete(routes, stats));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Panicking;

    impl ScanObserver for Panicking {
        fn on_file(&self, _relative: &Path) {
            panic!("observer bug");
        }
    }

    #[test]
    fn test_panicking_observer_does_not_starve_others() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Panicking));
        bus.subscribe(Arc::new(ScanCallbacks::new().on_file(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        bus.file(Path::new("a.router.rhai"));
        bus.file(Path::new("b.router.rhai"));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unset_hooks_are_skipped() {
        let bus = {
            let mut bus = EventBus::new();
            bus.subscribe(Arc::new(ScanCallbacks::new()));
            bus
        };
        bus.start(&[PathBuf::from("/srv")]);
        bus.complete(&[], &ScanStats::default());
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_complete_hook_receives_routes_and_stats() {
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let counter = seen.clone();

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(ScanCallbacks::new().on_complete(move |routes, stats| {
            counter.store(routes.len() + stats.files_scanned, Ordering::SeqCst);
        })));
        let stats = ScanStats {
            files_scanned: 3,
            ..ScanStats::default()
        };
        bus.complete(&[], &stats);

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
