//! Export validation.
//!
//! # Responsibilities
//! - Check that a module's default export is an array
//! - Check each element independently: a map with a non-empty `path`,
//!   a known `method`, a `handler` function pointer defined in the module
//!   and an optional string `description`
//! - Bind accepted handlers to the module they came from
//!
//! # Design Decisions
//! - One bad element never rejects its siblings
//! - Paths are normalized to a leading `/` here, joined with prefixes later

use std::sync::Arc;

use rhai::{Dynamic, Engine, FnPtr, Map, AST};

use crate::routing::path::normalize;
use crate::routing::{Handler, RouteMethod};
use crate::scanner::error::{InvalidExport, RejectReason};
use crate::scanner::loader::LoadedModule;
use crate::script::ScriptHandler;

/// A route element that passed validation.
#[derive(Clone)]
pub struct RouteDeclaration {
    pub path: String,
    pub method: RouteMethod,
    pub handler: Arc<dyn Handler>,
    pub description: Option<String>,
}

impl std::fmt::Debug for RouteDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDeclaration")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Verdict for one element of an export.
#[derive(Debug, Clone)]
pub enum ElementOutcome {
    Accepted(RouteDeclaration),
    Rejected(RejectReason),
}

impl ElementOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Clone)]
pub struct Validator {
    engine: Arc<Engine>,
}

fn required<'a>(map: &'a Map, field: &'static str) -> Result<&'a Dynamic, RejectReason> {
    map.get(field)
        .filter(|v| !v.is_unit())
        .ok_or(RejectReason::MissingField(field))
}

fn string_field(value: &Dynamic, field: &'static str) -> Result<String, RejectReason> {
    value
        .clone()
        .into_string()
        .map_err(|found| RejectReason::WrongType {
            field,
            expected: "a string",
            found: found.to_string(),
        })
}

impl Validator {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Validate every element of `module`'s export, in order.
    pub fn validate(&self, module: &LoadedModule) -> Result<Vec<ElementOutcome>, InvalidExport> {
        if module.export.is_unit() {
            return Err(InvalidExport::Missing {
                path: module.source_path.clone(),
            });
        }
        let elements = module
            .export
            .clone()
            .into_array()
            .map_err(|found| InvalidExport::NotASequence {
                path: module.source_path.clone(),
                found: found.to_string(),
            })?;

        Ok(elements
            .into_iter()
            .map(|element| match self.validate_element(element, &module.ast) {
                Ok(route) => ElementOutcome::Accepted(route),
                Err(reason) => ElementOutcome::Rejected(reason),
            })
            .collect())
    }

    fn validate_element(
        &self,
        element: Dynamic,
        ast: &Arc<AST>,
    ) -> Result<RouteDeclaration, RejectReason> {
        let type_name = element.type_name();
        let map = element
            .try_cast::<Map>()
            .ok_or_else(|| RejectReason::NotAMap(type_name.to_string()))?;

        let path = string_field(required(&map, "path")?, "path")?;
        if path.trim().is_empty() {
            return Err(RejectReason::EmptyField("path"));
        }

        let method = string_field(required(&map, "method")?, "method")?;
        let method: RouteMethod = method.parse().map_err(RejectReason::UnknownMethod)?;

        let handler = required(&map, "handler")?;
        let func = handler
            .clone()
            .try_cast::<FnPtr>()
            .ok_or_else(|| RejectReason::WrongType {
                field: "handler",
                expected: "a function pointer",
                found: handler.type_name().to_string(),
            })?;
        let handler = ScriptHandler::new(self.engine.clone(), ast.clone(), func)?;

        let description = match map.get("description").filter(|v| !v.is_unit()) {
            Some(value) => Some(string_field(value, "description")?),
            None => None,
        };

        Ok(RouteDeclaration {
            path: normalize(&path),
            method,
            handler: Arc::new(handler),
            description,
        })
    }
}
