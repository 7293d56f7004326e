//! Script runtime for router files.
//!
//! # Data Flow
//! ```text
//! CompilerConfig
//!     → engine.rs (Engine + registered Request/Response/Context/Database)
//!     → modules.rs (host modules + modules bundled by the compiler)
//!     → ScriptRuntime (shared by compiler, loader, validator, handlers)
//!
//! Request time:
//!     handler.rs → FnPtr call with (request, response, context)
//! ```
//!
//! # Design Decisions
//! - One engine for the whole process; each module gets a fresh scope
//! - Script output (`print`, `debug`) goes to tracing
//! - Imports never touch the filesystem at load time: bundled modules are
//!   registered by the compiler, everything else must be a host module

pub mod engine;
pub mod handler;
pub mod modules;

use std::sync::Arc;

use rhai::Engine;

pub use engine::{from_script, to_script};
pub use handler::ScriptHandler;
pub use modules::ModuleRegistry;

use crate::config::CompilerConfig;

/// Engine plus the module registry it resolves imports from.
#[derive(Clone)]
pub struct ScriptRuntime {
    engine: Arc<Engine>,
    modules: Arc<ModuleRegistry>,
}

impl ScriptRuntime {
    pub fn new(config: &CompilerConfig) -> Self {
        let modules = Arc::new(ModuleRegistry::with_host_modules());
        let engine = Arc::new(engine::build_engine(config, modules.clone()));
        Self { engine, modules }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new(&CompilerConfig::default())
    }
}
