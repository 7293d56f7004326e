//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use crate::context::database::DatabaseConfig;

/// Pattern used when a scan does not name one.
pub const DEFAULT_PATTERN: &str = "**/*.router.rhai";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Mount prefix for every route (e.g., "/api").
    pub prefix: String,

    /// Log one line per request.
    pub logger: bool,

    pub cors: CorsConfig,

    pub timeouts: TimeoutConfig,

    /// Router script discovery.
    pub router_scan: Option<RouterScanConfig>,

    /// Additional labelled scans mounted under their own base path.
    pub modules: Vec<ModuleConfig>,

    /// Router script compilation settings.
    pub compiler: CompilerConfig,

    pub database: Option<DatabaseConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            prefix: "/api".to_string(),
            logger: false,
            cors: CorsConfig::default(),
            timeouts: TimeoutConfig::default(),
            router_scan: None,
            modules: Vec::new(),
            compiler: CompilerConfig::default(),
            database: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// One pattern or a list of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Self::One(DEFAULT_PATTERN.to_string())
    }
}

impl Patterns {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(p) => std::slice::from_ref(p),
            Self::Many(ps) => ps,
        }
    }
}

impl From<&str> for Patterns {
    fn from(pattern: &str) -> Self {
        Self::One(pattern.to_string())
    }
}

impl From<Vec<String>> for Patterns {
    fn from(patterns: Vec<String>) -> Self {
        Self::Many(patterns)
    }
}

/// Directories and patterns to scan for router scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Base directories, relative ones resolved against the scan root.
    pub paths: Vec<PathBuf>,

    #[serde(default)]
    pub pattern: Patterns,
}

impl ScanConfig {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            pattern: Patterns::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<Patterns>) -> Self {
        self.pattern = pattern.into();
        self
    }
}

/// `[router_scan]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterScanConfig {
    #[serde(flatten)]
    pub scan: ScanConfig,

    /// Root for relative paths; defaults to the working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[[modules]]` entry: a labelled scan mounted under `base`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    pub label: String,

    #[serde(default)]
    pub base: String,

    #[serde(flatten)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// How compiled router scripts are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompileStrategy {
    /// Evaluate the compiled module in memory, inside a fresh scope.
    Scoped,
    /// Write a temporary artifact and load it through the engine's file
    /// loader.
    #[default]
    Artifact,
}

/// `[compiler]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub strategy: CompileStrategy,

    /// Import specifiers resolved by the host at load time, never bundled.
    pub externals: Vec<String>,

    /// Where temporary artifacts are written; defaults to a directory
    /// under the system temp dir.
    pub artifact_dir: Option<PathBuf>,

    /// Operation budget per script call, 0 for unlimited.
    pub max_operations: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strategy: CompileStrategy::default(),
            externals: vec!["uuid".to_string(), "time".to_string()],
            artifact_dir: None,
            max_operations: 0,
        }
    }
}

impl CompilerConfig {
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("advance-api-artifacts"))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ApiConfig = toml::from_str("").unwrap();
        assert_eq!(config.prefix, "/api");
        assert!(config.router_scan.is_none());
        assert_eq!(config.compiler.strategy, CompileStrategy::Artifact);
        assert_eq!(config.compiler.externals, vec!["uuid", "time"]);
    }

    #[test]
    fn test_pattern_accepts_string_or_list() {
        let config: ApiConfig = toml::from_str(
            r#"
            [router_scan]
            paths = ["server"]
            pattern = "**/*.api.rhai"

            [[modules]]
            label = "users"
            base = "/user"
            paths = ["modules/users"]
            pattern = ["*.rhai", "nested/*.rhai"]
            "#,
        )
        .unwrap();

        let scan = config.router_scan.unwrap();
        assert_eq!(scan.scan.paths, vec![PathBuf::from("server")]);
        assert_eq!(scan.scan.pattern.as_slice(), ["**/*.api.rhai".to_string()]);

        let module = &config.modules[0];
        assert_eq!(module.base, "/user");
        assert_eq!(module.scan.pattern.as_slice().len(), 2);
    }

    #[test]
    fn test_pattern_defaults_to_router_suffix() {
        let config: ApiConfig = toml::from_str("[router_scan]\npaths = [\"server\"]").unwrap();
        assert_eq!(
            config.router_scan.unwrap().scan.pattern.as_slice(),
            [DEFAULT_PATTERN.to_string()]
        );
    }
}
