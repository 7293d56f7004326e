//! Route handlers backed by script functions.
//!
//! # Design Decisions
//! - A handler runs through a small call AST: the module's top-level
//!   `import` statements followed by the call itself. Functions and closures
//!   of the module are merged in, so handlers see the same namespaces as the
//!   module body did at load time
//! - Imports resolve against the shared module registry, so replaying them
//!   per call never re-evaluates a helper script

use std::sync::Arc;

use rhai::{Dynamic, Engine, Expr, FnPtr, Scope, Stmt, AST};
use serde_json::Value;

use crate::context::SharedContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::routing::{Handler, HandlerError};
use crate::scanner::error::RejectReason;
use crate::script::engine::from_script;

/// Handlers receive at most `(request, response, context)`.
pub const MAX_HANDLER_ARITY: usize = 3;

const ARGUMENTS: [&str; MAX_HANDLER_ARITY] = ["request", "response", "context"];

/// A script function bound to the module it was declared in.
pub struct ScriptHandler {
    engine: Arc<Engine>,
    call: AST,
    func: FnPtr,
    arity: usize,
}

impl std::fmt::Debug for ScriptHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("function", &self.func.fn_name())
            .field("arity", &self.arity)
            .finish()
    }
}

/// Parameters the script must supply for `func`, after curried values.
///
/// With several overloads, the widest one that fits is used.
fn declared_arity(ast: &AST, func: &FnPtr) -> Result<usize, RejectReason> {
    let curried = func.curry().len();
    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == func.fn_name())
        .filter_map(|f| f.params.len().checked_sub(curried))
        .collect();

    if let Some(arity) = arities.iter().copied().filter(|&a| a <= MAX_HANDLER_ARITY).max() {
        return Ok(arity);
    }
    match arities.iter().copied().min() {
        Some(arity) => Err(RejectReason::HandlerArity {
            name: func.fn_name().to_string(),
            arity,
        }),
        None => Err(RejectReason::UnknownHandler(func.fn_name().to_string())),
    }
}

/// `(specifier, alias)` of every top-level `import` in `ast`.
fn module_imports(ast: &AST) -> Vec<(String, String)> {
    ast.statements()
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Import(import, ..) => match &import.0 {
                Expr::StringConstant(specifier, ..) if !import.1.name.is_empty() => {
                    Some((specifier.to_string(), import.1.name.to_string()))
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn string_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Source of the call AST for a handler taking `arity` arguments.
fn call_source(imports: &[(String, String)], arity: usize) -> String {
    let mut source = String::new();
    for (specifier, alias) in imports {
        source.push_str(&format!("import {} as {};\n", string_literal(specifier), alias));
    }
    source.push_str(&format!("handler.call({})\n", ARGUMENTS[..arity].join(", ")));
    source
}

impl ScriptHandler {
    /// Bind `func` to `ast`. The function must be defined in `ast` itself.
    pub fn new(engine: Arc<Engine>, ast: Arc<AST>, func: FnPtr) -> Result<Self, RejectReason> {
        let arity = declared_arity(&ast, &func)?;

        let source = call_source(&module_imports(&ast), arity);
        let mut call = engine
            .compile(&source)
            .map(|call| ast.clone_functions_only().merge(&call))
            .map_err(|e| RejectReason::HandlerBinding {
                name: func.fn_name().to_string(),
                message: e.to_string(),
            })?;
        if let Some(source) = ast.source() {
            call.set_source(source);
        }

        Ok(Self {
            engine,
            call,
            func,
            arity,
        })
    }

    pub fn name(&self) -> &str {
        self.func.fn_name()
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl Handler for ScriptHandler {
    fn call(
        &self,
        request: ApiRequest,
        response: ApiResponse,
        context: &SharedContext,
    ) -> Result<Option<Value>, HandlerError> {
        let mut scope = Scope::new();
        scope.push("handler", self.func.clone());
        scope.push("request", request);
        scope.push("response", response);
        scope.push("context", context.clone());

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.call)
            .map_err(|e| HandlerError::Script(e.to_string()))?;

        if result.is_unit() {
            return Ok(None);
        }
        from_script(&result)
            .map(Some)
            .map_err(|e| HandlerError::Script(format!("unserializable return value: {}", e)))
    }
}
