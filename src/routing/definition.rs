//! Route declarations shared by the scanner, the mounting layer and the
//! built-in routes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use axum::routing::MethodFilter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::context::SharedContext;
use crate::http::{ApiRequest, ApiResponse};

/// HTTP verbs a route declaration may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }

    pub fn filter(&self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Put => MethodFilter::PUT,
            Self::Delete => MethodFilter::DELETE,
            Self::Patch => MethodFilter::PATCH,
            Self::Options => MethodFilter::OPTIONS,
            Self::Head => MethodFilter::HEAD,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            "patch" => Ok(Self::Patch),
            "options" => Ok(Self::Options),
            "head" => Ok(Self::Head),
            _ => Err(s.to_string()),
        }
    }
}

/// Where a route declaration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Absolute path of the router script.
    pub source_file: PathBuf,
    /// Label of the module scan that discovered it, if any.
    pub module_label: Option<String>,
}

impl Provenance {
    pub fn new(source_file: impl Into<PathBuf>, module_label: Option<String>) -> Self {
        Self {
            source_file: source_file.into(),
            module_label,
        }
    }

    /// Provenance for routes compiled into the binary.
    pub fn builtin() -> Self {
        Self::new("<builtin>", Some(BUILTIN_MODULE.to_string()))
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }
}

/// Module label used for built-in routes.
pub const BUILTIN_MODULE: &str = "builtin";

/// Failure raised by a route handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("script error: {0}")]
    Script(String),

    #[error("{0}")]
    Context(String),
}

/// Anything that can serve a route: `(request, response, context)`.
///
/// A handler either terminates the request through the [`ApiResponse`]
/// helper or returns a value, which the mounting layer sends as the `data`
/// of a success envelope.
pub trait Handler: Send + Sync {
    fn call(
        &self,
        request: ApiRequest,
        response: ApiResponse,
        context: &SharedContext,
    ) -> Result<Option<Value>, HandlerError>;
}

/// Adapter turning a closure into a [`Handler`].
pub struct FnHandler<F>(pub F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(ApiRequest, ApiResponse, &SharedContext) -> Result<Option<Value>, HandlerError>
        + Send
        + Sync,
{
    fn call(
        &self,
        request: ApiRequest,
        response: ApiResponse,
        context: &SharedContext,
    ) -> Result<Option<Value>, HandlerError> {
        (self.0)(request, response, context)
    }
}

/// A validated route declaration.
#[derive(Clone)]
pub struct RouteDefinition {
    /// Mount-relative path, always starting with `/`.
    pub path: String,
    pub method: RouteMethod,
    pub handler: Arc<dyn Handler>,
    pub description: Option<String>,
    pub provenance: Provenance,
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("description", &self.description)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}
