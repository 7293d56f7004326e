//! Source compilation.
//!
//! # Responsibilities
//! - Turn a router script into a self-contained executable module
//! - Bundle local imports (`./`, `../`, absolute paths), leave host modules
//!   (the externals list) to be resolved at load time
//! - Detect unresolvable and circular imports before anything runs
//!
//! # Data Flow
//! ```text
//! router.rhai
//!     → parse, collect `import` statements from the AST
//!     → Bundler (rewrite local import literals to canonical keys,
//!                compile + evaluate each dependency once)
//!     → ModuleRegistry (dependency modules)
//!     → ScopedCompiler   → CompiledModule::Scoped (AST in memory)
//!     → ArtifactCompiler → CompiledModule::Artifact (temporary file)
//! ```
//!
//! # Design Decisions
//! - Compilation is synchronous; the scanner runs it on the blocking pool
//! - Artifacts are `NamedTempFile`s: dropping one removes the file, so no
//!   code path can leak it
//! - Imports are read from the parsed AST, so commented-out or quoted
//!   `import` text is never mistaken for a dependency
//! - Dependency keys are canonical paths, so one helper imported through
//!   different relative specifiers is evaluated once per compilation

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rhai::{ASTNode, Engine, Expr, Module, Scope, Shared, Stmt, AST};
use tempfile::NamedTempFile;

use crate::config::{CompileStrategy, CompilerConfig};
use crate::scanner::error::CompileError;
use crate::script::{ModuleRegistry, ScriptRuntime};

/// Output format of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Parsed AST, evaluated directly.
    Ast,
    /// Script text on disk, loaded through the engine's file loader.
    ScriptFile,
}

/// A module compiled for in-memory evaluation.
#[derive(Debug)]
pub struct ScopedModule {
    pub source_path: PathBuf,
    pub generated_code: String,
    pub ast: AST,
}

/// A module written to a temporary file. The file is removed when the
/// artifact is dropped or closed.
#[derive(Debug)]
pub struct CompilationArtifact {
    pub source_path: PathBuf,
    pub generated_code: String,
    pub target: TargetFormat,
    pub file: NamedTempFile,
}

impl CompilationArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Result of compiling one router script.
#[derive(Debug)]
pub enum CompiledModule {
    Scoped(ScopedModule),
    Artifact(CompilationArtifact),
}

impl CompiledModule {
    pub fn source_path(&self) -> &Path {
        match self {
            Self::Scoped(m) => &m.source_path,
            Self::Artifact(a) => &a.source_path,
        }
    }

    pub fn generated_code(&self) -> &str {
        match self {
            Self::Scoped(m) => &m.generated_code,
            Self::Artifact(a) => &a.generated_code,
        }
    }

    pub fn target(&self) -> TargetFormat {
        match self {
            Self::Scoped(_) => TargetFormat::Ast,
            Self::Artifact(a) => a.target,
        }
    }
}

/// Compiles router scripts into loadable modules.
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, source: &Path) -> Result<CompiledModule, CompileError>;
}

fn is_local(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || Path::new(specifier).is_absolute()
}

/// Canonical path of a local import, `.rhai` appended when the specifier
/// has no extension.
fn resolve_local(dir: &Path, specifier: &str) -> Option<PathBuf> {
    let candidate = dir.join(specifier);
    let candidate = if candidate.extension().is_none() {
        candidate.with_extension("rhai")
    } else {
        candidate
    };
    candidate.canonicalize().ok()
}

/// Registry key for a bundled dependency.
fn module_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Canonical path of the file being compiled.
fn canonical_source(source: &Path) -> Result<PathBuf, CompileError> {
    source.canonicalize().map_err(|e| CompileError::Read {
        path: source.to_path_buf(),
        source: e,
    })
}

fn parse(engine: &Engine, path: &Path, code: &str) -> Result<AST, CompileError> {
    engine.compile(code).map_err(|e| CompileError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// An `import` statement with a literal specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportSite {
    specifier: String,
    line: usize,
    column: usize,
}

/// Every literal `import` in `ast`, function bodies included, in source
/// order. Imports of computed paths cannot be bundled and are skipped.
fn import_sites(ast: &AST) -> Vec<ImportSite> {
    let mut sites = Vec::new();
    ast.walk(&mut |nodes: &[ASTNode]| {
        if let Some(ASTNode::Stmt(Stmt::Import(import, ..))) = nodes.last() {
            if let Expr::StringConstant(specifier, pos) = &import.0 {
                if let (Some(line), Some(column)) = (pos.line(), pos.position()) {
                    sites.push(ImportSite {
                        specifier: specifier.to_string(),
                        line,
                        column,
                    });
                }
            }
        }
        true
    });
    sites.sort_by_key(|s| (s.line, s.column));
    sites.dedup();
    sites
}

/// Byte range of the string literal starting at `line`:`column` (1-based,
/// counted in characters).
fn literal_span(source: &str, line: usize, column: usize) -> Option<(usize, usize)> {
    let mut current = (1, 1);
    let mut start = None;
    for (offset, ch) in source.char_indices() {
        if current == (line, column) {
            start = Some(offset);
            break;
        }
        current = if ch == '\n' {
            (current.0 + 1, 1)
        } else {
            (current.0, current.1 + 1)
        };
    }
    let start = start?;
    let rest = &source[start..];

    // #"raw"#
    let hashes = rest.chars().take_while(|&c| c == '#').count();
    if hashes > 0 {
        let closing = format!("\"{}", "#".repeat(hashes));
        let body = hashes + 1;
        if !rest[hashes..].starts_with('"') {
            return None;
        }
        let end = rest[body..].find(&closing)?;
        return Some((start, start + body + end + closing.len()));
    }

    let delimiter = rest.chars().next().filter(|&c| c == '"' || c == '`')?;
    let mut escaped = false;
    for (offset, ch) in rest.char_indices().skip(1) {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == delimiter => return Some((start, start + offset + c.len_utf8())),
            _ => {}
        }
    }
    None
}

fn quote(key: &str) -> String {
    format!("\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Resolves the import graph of one router script.
struct Bundler<'a> {
    engine: &'a Engine,
    externals: &'a [String],
    registry: &'a ModuleRegistry,
    compiled: HashMap<PathBuf, Shared<Module>>,
    in_progress: Vec<PathBuf>,
}

impl<'a> Bundler<'a> {
    fn new(engine: &'a Engine, externals: &'a [String], registry: &'a ModuleRegistry) -> Self {
        Self {
            engine,
            externals,
            registry,
            compiled: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Generated code for `path` with every local import rewritten.
    fn bundle_root(&mut self, path: &Path) -> Result<String, CompileError> {
        self.in_progress.push(path.to_path_buf());
        let result = self.rewrite(path);
        self.in_progress.pop();
        result
    }

    fn rewrite(&mut self, path: &Path) -> Result<String, CompileError> {
        let source = fs::read_to_string(path).map_err(|e| CompileError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let ast = parse(self.engine, path, &source)?;

        let mut code = String::with_capacity(source.len());
        let mut last = 0;
        for site in import_sites(&ast) {
            let specifier = site.specifier.as_str();
            if self.externals.iter().any(|e| e == specifier) {
                continue;
            }
            let unresolved = || CompileError::UnresolvedImport {
                path: path.to_path_buf(),
                specifier: specifier.to_string(),
            };
            if !is_local(specifier) {
                return Err(unresolved());
            }
            let dependency = resolve_local(dir, specifier).ok_or_else(unresolved)?;
            self.dependency(path, &dependency)?;

            let (start, end) = literal_span(&source, site.line, site.column)
                .filter(|&(start, _)| start >= last)
                .ok_or_else(|| CompileError::Syntax {
                    path: path.to_path_buf(),
                    message: format!(
                        "cannot locate import \"{}\" at line {}, position {}",
                        specifier, site.line, site.column
                    ),
                })?;
            code.push_str(&source[last..start]);
            code.push_str(&quote(&module_key(&dependency)));
            last = end;
        }
        code.push_str(&source[last..]);
        Ok(code)
    }

    fn dependency(&mut self, importer: &Path, dependency: &Path) -> Result<(), CompileError> {
        if self.compiled.contains_key(dependency) {
            return Ok(());
        }
        if self.in_progress.iter().any(|p| p == dependency) {
            return Err(CompileError::CircularImport {
                path: importer.to_path_buf(),
                dependency: dependency.to_path_buf(),
            });
        }

        self.in_progress.push(dependency.to_path_buf());
        let result = self.build(importer, dependency);
        self.in_progress.pop();

        let module = result?;
        self.registry.register_bundled(module_key(dependency), module.clone());
        self.compiled.insert(dependency.to_path_buf(), module);
        Ok(())
    }

    fn build(&mut self, importer: &Path, dependency: &Path) -> Result<Shared<Module>, CompileError> {
        let code = self.rewrite(dependency)?;
        let mut ast = parse(self.engine, dependency, &code)?;
        ast.set_source(dependency.to_string_lossy().as_ref());

        let module = Module::eval_ast_as_new(Scope::new(), &ast, self.engine).map_err(|e| {
            CompileError::Dependency {
                path: importer.to_path_buf(),
                dependency: dependency.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        Ok(Shared::new(module))
    }
}

/// Shared front half of both strategies: bundle and syntax-check.
fn compile_source(
    runtime: &ScriptRuntime,
    externals: &[String],
    source: &Path,
) -> Result<(PathBuf, String, AST), CompileError> {
    let path = canonical_source(source)?;
    let code = Bundler::new(runtime.engine(), externals, runtime.modules()).bundle_root(&path)?;

    let mut ast = parse(runtime.engine(), &path, &code)?;
    ast.set_source(path.to_string_lossy().as_ref());

    tracing::debug!(file = %path.display(), bytes = code.len(), "Compiled router script");
    Ok((path, code, ast))
}

/// Compiles into an in-memory AST.
pub struct ScopedCompiler {
    runtime: ScriptRuntime,
    externals: Vec<String>,
}

impl ScopedCompiler {
    pub fn new(runtime: ScriptRuntime, externals: Vec<String>) -> Self {
        Self { runtime, externals }
    }
}

impl SourceCompiler for ScopedCompiler {
    fn compile(&self, source: &Path) -> Result<CompiledModule, CompileError> {
        let (source_path, generated_code, ast) =
            compile_source(&self.runtime, &self.externals, source)?;
        Ok(CompiledModule::Scoped(ScopedModule {
            source_path,
            generated_code,
            ast,
        }))
    }
}

/// Compiles into a uniquely named temporary script file.
pub struct ArtifactCompiler {
    runtime: ScriptRuntime,
    externals: Vec<String>,
    artifact_dir: PathBuf,
}

impl ArtifactCompiler {
    pub fn new(runtime: ScriptRuntime, externals: Vec<String>, artifact_dir: PathBuf) -> Self {
        Self {
            runtime,
            externals,
            artifact_dir,
        }
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }
}

impl SourceCompiler for ArtifactCompiler {
    fn compile(&self, source: &Path) -> Result<CompiledModule, CompileError> {
        let (source_path, generated_code, _ast) =
            compile_source(&self.runtime, &self.externals, source)?;

        let artifact_error = |e| CompileError::Artifact {
            path: source_path.clone(),
            source: e,
        };
        fs::create_dir_all(&self.artifact_dir).map_err(artifact_error)?;
        let mut file = tempfile::Builder::new()
            .prefix(".routes-")
            .suffix(".rhai")
            .rand_bytes(12)
            .tempfile_in(&self.artifact_dir)
            .map_err(artifact_error)?;
        file.write_all(generated_code.as_bytes())
            .and_then(|_| file.flush())
            .map_err(artifact_error)?;

        tracing::debug!(
            file = %source_path.display(),
            artifact = %file.path().display(),
            "Wrote compilation artifact"
        );

        Ok(CompiledModule::Artifact(CompilationArtifact {
            source_path,
            generated_code,
            target: TargetFormat::ScriptFile,
            file,
        }))
    }
}

/// Compiler for the configured strategy.
pub fn compiler_for(runtime: &ScriptRuntime, config: &CompilerConfig) -> Arc<dyn SourceCompiler> {
    match config.strategy {
        CompileStrategy::Scoped => Arc::new(ScopedCompiler::new(runtime.clone(), config.externals.clone())),
        CompileStrategy::Artifact => Arc::new(ArtifactCompiler::new(
            runtime.clone(),
            config.externals.clone(),
            config.artifact_dir(),
        )),
    }
}
