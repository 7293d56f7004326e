//! Import resolution for router scripts.
//!
//! Two kinds of modules can be imported:
//! - host modules (`uuid`, `time`) provided natively by the server
//! - local helper scripts, compiled and registered by the source compiler
//!   under their canonical path
//!
//! Anything else fails with a module-not-found error.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};

/// Registry of importable modules.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    host: DashMap<String, Shared<Module>>,
    bundled: DashMap<String, Shared<Module>>,
}

fn uuid_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("v4", || -> Result<String, Box<EvalAltResult>> {
        Ok(uuid::Uuid::new_v4().to_string())
    });
    module
}

fn time_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("now_ms", || -> Result<i64, Box<EvalAltResult>> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?;
        Ok(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    });
    module
}

impl ModuleRegistry {
    /// Registry with the built-in host modules.
    pub fn with_host_modules() -> Self {
        let registry = Self::default();
        registry.register_host("uuid", uuid_module());
        registry.register_host("time", time_module());
        registry
    }

    pub fn register_host(&self, name: impl Into<String>, module: Module) {
        self.host.insert(name.into(), Shared::new(module));
    }

    pub fn is_host(&self, name: &str) -> bool {
        self.host.contains_key(name)
    }

    /// Register a compiled helper under its canonical key.
    pub fn register_bundled(&self, key: impl Into<String>, module: Shared<Module>) {
        self.bundled.insert(key.into(), module);
    }

    pub fn bundled_len(&self) -> usize {
        self.bundled.len()
    }

    fn lookup(&self, path: &str) -> Option<Shared<Module>> {
        self.bundled
            .get(path)
            .or_else(|| self.host.get(path))
            .map(|m| m.value().clone())
    }
}

/// Engine-side resolver backed by a shared [`ModuleRegistry`].
pub struct RegistryResolver(pub Shared<ModuleRegistry>);

impl ModuleResolver for RegistryResolver {
    fn resolve(
        &self,
        _engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        self.0
            .lookup(path)
            .ok_or_else(|| EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_modules_are_registered() {
        let registry = ModuleRegistry::with_host_modules();
        assert!(registry.is_host("uuid"));
        assert!(registry.is_host("time"));
        assert!(!registry.is_host("fs"));
    }

    #[test]
    fn test_bundled_modules_shadow_nothing_else() {
        let registry = ModuleRegistry::with_host_modules();
        registry.register_bundled("/srv/helpers.rhai", Shared::new(Module::new()));
        assert!(registry.lookup("/srv/helpers.rhai").is_some());
        assert!(registry.lookup("uuid").is_some());
        assert!(registry.lookup("./helpers").is_none());
        assert_eq!(registry.bundled_len(), 1);
    }
}
