//! Error taxonomy for router discovery.
//!
//! Everything except [`ScanError`] is non-fatal: the scanner records it as a
//! [`ScanIssue`] and moves on to the next directory, pattern, file or element.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A router script could not be turned into an executable module.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("syntax error in {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("cannot resolve import \"{specifier}\" in {}", path.display())]
    UnresolvedImport { path: PathBuf, specifier: String },

    #[error("circular import of {} from {}", dependency.display(), path.display())]
    CircularImport { path: PathBuf, dependency: PathBuf },

    #[error("dependency {} of {} failed to initialize: {message}", dependency.display(), path.display())]
    Dependency {
        path: PathBuf,
        dependency: PathBuf,
        message: String,
    },

    #[error("failed to write compilation artifact for {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CompileError {
    /// The router script this error belongs to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Syntax { path, .. }
            | Self::UnresolvedImport { path, .. }
            | Self::CircularImport { path, .. }
            | Self::Dependency { path, .. }
            | Self::Artifact { path, .. } => path,
        }
    }
}

/// A compiled module failed while being loaded or executed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load artifact {} for {}: {message}", artifact.display(), path.display())]
    Artifact {
        path: PathBuf,
        artifact: PathBuf,
        message: String,
    },

    #[error("execution of {} failed: {message}", path.display())]
    Execution { path: PathBuf, message: String },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Artifact { path, .. } | Self::Execution { path, .. } => path,
        }
    }
}

/// The default export of a module is unusable as a route list.
#[derive(Debug, Error)]
pub enum InvalidExport {
    #[error("{} has no default export", path.display())]
    Missing { path: PathBuf },

    #[error("default export of {} is {found}, not an array", path.display())]
    NotASequence { path: PathBuf, found: String },
}

/// Why a single element of an export was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("expected an object map, found {0}")]
    NotAMap(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("unsupported method `{0}`")]
    UnknownMethod(String),

    #[error("handler `{0}` is not a function defined in this file")]
    UnknownHandler(String),

    #[error("handler `{name}` takes {arity} parameters, at most 3 are passed")]
    HandlerArity { name: String, arity: usize },

    #[error("handler `{name}` cannot be bound to its module: {message}")]
    HandlerBinding { name: String, message: String },
}

/// A recoverable problem encountered during a scan.
#[derive(Debug, Error)]
pub enum ScanIssue {
    #[error("path does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("pattern `{pattern}` failed in {}: {message}", dir.display())]
    PatternMatchFailure {
        dir: PathBuf,
        pattern: String,
        message: String,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    InvalidExport(#[from] InvalidExport),

    #[error("invalid route #{index} in {}: {reason}", file.display())]
    InvalidRouteElement {
        file: PathBuf,
        index: usize,
        reason: RejectReason,
    },
}

impl ScanIssue {
    /// Issues that count towards the scan's error counter.
    ///
    /// Missing directories are plain warnings and rejected elements are
    /// tracked by their own counter.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::PathNotFound { .. } | Self::InvalidRouteElement { .. }
        )
    }
}

/// Fatal scan failure. Never produced by bad input files.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan worker for {} failed: {message}", file.display())]
    Internal { file: PathBuf, message: String },
}
