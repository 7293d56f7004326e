//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Router scripts (scanner) ─┐
//!                           ├→ RouteDefinition[] (definition.rs)
//! Built-in routes ──────────┘
//!     → path.rs (join prefix/base/path, translate :param syntax)
//!     → http::mount (bind handlers, resolve conflicts)
//!     → collector.rs (route table for introspection and logging)
//! ```
//!
//! # Design Decisions
//! - Routes are fixed after startup; nothing is added at runtime
//! - Declaration order is registration order
//! - First registration wins on conflicting path + method

pub mod collector;
pub mod definition;
pub mod path;

pub use collector::{RouteCollector, RouteInfo};
pub use definition::{
    FnHandler, Handler, HandlerError, Provenance, RouteDefinition, RouteMethod, BUILTIN_MODULE,
};
