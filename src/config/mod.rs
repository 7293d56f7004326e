//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ApiConfig (validated, immutable)
//!     → consumed once by startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ApiConfig;
pub use schema::CompileStrategy;
pub use schema::CompilerConfig;
pub use schema::DatabaseConfig;
pub use schema::ListenerConfig;
pub use schema::ModuleConfig;
pub use schema::ObservabilityConfig;
pub use schema::Patterns;
pub use schema::RouterScanConfig;
pub use schema::ScanConfig;
pub use schema::DEFAULT_PATTERN;
