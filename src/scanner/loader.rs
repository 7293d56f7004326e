//! Module loading.
//!
//! # Responsibilities
//! - Execute a compiled module in an isolated scope
//! - Expose its default export (the value of the final expression)
//! - Remove compilation artifacts exactly once, whatever the outcome
//!
//! # Design Decisions
//! - Every module gets a fresh `Scope` holding only `MODULE_FILE` and
//!   `MODULE_DIR`; nothing leaks between router files
//! - Artifact cleanup failures are logged, never propagated

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope, AST};

use crate::scanner::compiler::{CompilationArtifact, CompiledModule};
use crate::scanner::error::LoadError;

/// A module after execution.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub source_path: PathBuf,
    /// Value of the module's final expression; unit when there is none.
    pub export: Dynamic,
    /// Functions the export's handlers refer to.
    pub ast: Arc<AST>,
}

/// Executes compiled modules.
#[derive(Clone)]
pub struct ModuleLoader {
    engine: Arc<Engine>,
}

impl ModuleLoader {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn load(&self, module: CompiledModule) -> Result<LoadedModule, LoadError> {
        match module {
            CompiledModule::Scoped(module) => self.evaluate(module.source_path, module.ast),
            CompiledModule::Artifact(artifact) => self.load_artifact(artifact),
        }
    }

    fn load_artifact(&self, artifact: CompilationArtifact) -> Result<LoadedModule, LoadError> {
        let CompilationArtifact {
            source_path, file, ..
        } = artifact;
        let artifact_path = file.path().to_path_buf();

        let loaded = self
            .engine
            .compile_file(artifact_path.clone())
            .map_err(|e| LoadError::Artifact {
                path: source_path.clone(),
                artifact: artifact_path.clone(),
                message: e.to_string(),
            })
            .and_then(|mut ast| {
                ast.set_source(source_path.to_string_lossy().as_ref());
                self.evaluate(source_path.clone(), ast)
            });

        if let Err(e) = file.close() {
            tracing::warn!(
                artifact = %artifact_path.display(),
                error = %e,
                "Failed to remove compilation artifact"
            );
        }

        loaded
    }

    fn evaluate(&self, source_path: PathBuf, ast: AST) -> Result<LoadedModule, LoadError> {
        let mut scope = module_scope(&source_path);
        let export = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| LoadError::Execution {
                path: source_path.clone(),
                message: e.to_string(),
            })?;

        Ok(LoadedModule {
            source_path,
            export,
            ast: Arc::new(ast),
        })
    }
}

fn module_scope(source_path: &Path) -> Scope<'static> {
    let dir = source_path
        .parent()
        .map(|d| d.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut scope = Scope::new();
    scope.push_constant("MODULE_FILE", source_path.to_string_lossy().into_owned());
    scope.push_constant("MODULE_DIR", dir);
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::compiler::{ArtifactCompiler, ScopedCompiler, SourceCompiler};
    use crate::script::ScriptRuntime;
    use std::fs;
    use tempfile::TempDir;

    fn router(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("a.router.rhai");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_scoped_module_exports_final_expression() {
        let dir = TempDir::new().unwrap();
        let path = router(&dir, "let n = 40;\n[n + 2]");
        let runtime = ScriptRuntime::default();

        let compiled = ScopedCompiler::new(runtime.clone(), Vec::new()).compile(&path).unwrap();
        let loaded = ModuleLoader::new(runtime.engine().clone()).load(compiled).unwrap();

        let export = loaded.export.into_array().unwrap();
        assert_eq!(export[0].as_int().unwrap(), 42);
    }

    #[test]
    fn test_module_sees_its_own_location() {
        let dir = TempDir::new().unwrap();
        let path = router(&dir, "MODULE_FILE");
        let runtime = ScriptRuntime::default();

        let compiled = ScopedCompiler::new(runtime.clone(), Vec::new()).compile(&path).unwrap();
        let loaded = ModuleLoader::new(runtime.engine().clone()).load(compiled).unwrap();

        let file = loaded.export.into_string().unwrap();
        assert!(file.ends_with("a.router.rhai"));
    }

    #[test]
    fn test_artifact_removed_after_successful_load() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        let path = router(&dir, "[]");
        let runtime = ScriptRuntime::default();

        let compiled = ArtifactCompiler::new(runtime.clone(), Vec::new(), artifacts.clone())
            .compile(&path)
            .unwrap();
        ModuleLoader::new(runtime.engine().clone()).load(compiled).unwrap();

        assert_eq!(fs::read_dir(&artifacts).unwrap().count(), 0);
    }

    #[test]
    fn test_artifact_removed_after_failed_execution() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        let path = router(&dir, "throw \"module init failed\";");
        let runtime = ScriptRuntime::default();

        let compiled = ArtifactCompiler::new(runtime.clone(), Vec::new(), artifacts.clone())
            .compile(&path)
            .unwrap();
        let err = ModuleLoader::new(runtime.engine().clone()).load(compiled).unwrap_err();

        assert!(matches!(err, LoadError::Execution { .. }));
        assert!(err.to_string().contains("module init failed"));
        assert_eq!(fs::read_dir(&artifacts).unwrap().count(), 0);
    }

    #[test]
    fn test_imported_helper_is_available_at_load_time() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("helpers.rhai"), "fn double(x) { x * 2 }").unwrap();
        let path = router(&dir, "import \"./helpers\" as h;\nh::double(21)");
        let runtime = ScriptRuntime::default();

        let compiled = ArtifactCompiler::new(runtime.clone(), Vec::new(), dir.path().join("out"))
            .compile(&path)
            .unwrap();
        let loaded = ModuleLoader::new(runtime.engine().clone()).load(compiled).unwrap();

        assert_eq!(loaded.export.as_int().unwrap(), 42);
    }
}
