//! Advance API: file-based HTTP routes backed by embedded scripts.
//!
//! Router scripts (`*.router.rhai`) declare an array of
//! `#{ path, method, handler, description }` maps. At startup they are
//! discovered, compiled, loaded in isolation, validated and mounted under a
//! common prefix.

pub mod config;
pub mod context;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod scanner;
pub mod script;

pub use config::schema::ApiConfig;
pub use context::SharedContext;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
pub use scanner::{Pipeline, ScanResult, Scanner};
pub use script::ScriptRuntime;
