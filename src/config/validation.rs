//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (timeouts > 0, body limit > 0)
//! - Check scan settings (non-empty paths and patterns, labelled modules)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ApiConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ApiConfig, ScanConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn validate_scan(field: &str, scan: &ScanConfig, errors: &mut Vec<ValidationError>) {
    if scan.paths.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.paths", field),
            "at least one path is required",
        ));
    }

    let patterns = scan.pattern.as_slice();
    if patterns.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.pattern", field),
            "at least one pattern is required",
        ));
    }
    if patterns.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError::new(
            format!("{}.pattern", field),
            "patterns must not be empty",
        ));
    }
}

/// Check everything serde cannot.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if !config.prefix.is_empty() && !config.prefix.starts_with('/') {
        errors.push(ValidationError::new("prefix", "must start with `/`"));
    }

    if let Some(scan) = &config.router_scan {
        validate_scan("router_scan", &scan.scan, &mut errors);
    }

    let mut labels = HashSet::new();
    for (i, module) in config.modules.iter().enumerate() {
        let field = format!("modules[{}]", i);
        if module.label.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.label", field), "must not be empty"));
        } else if !labels.insert(module.label.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.label", field),
                format!("duplicate module label `{}`", module.label),
            ));
        }
        if !module.base.is_empty() && !module.base.starts_with('/') {
            errors.push(ValidationError::new(format!("{}.base", field), "must start with `/`"));
        }
        validate_scan(&field, &module.scan, &mut errors);
    }

    if config.compiler.externals.iter().any(|e| e.trim().is_empty()) {
        errors.push(ValidationError::new("compiler.externals", "entries must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be `pretty` or `json`",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ModuleConfig, Patterns, RouterScanConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ApiConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ApiConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.prefix = "api".into();
        config.router_scan = Some(RouterScanConfig {
            scan: ScanConfig {
                paths: Vec::new(),
                pattern: Patterns::Many(Vec::new()),
            },
            root: None,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "prefix",
                "router_scan.paths",
                "router_scan.pattern"
            ]
        );
    }

    #[test]
    fn test_duplicate_module_labels() {
        let module = ModuleConfig {
            label: "users".into(),
            base: "/user".into(),
            scan: ScanConfig::new(["modules/users"]),
            root: None,
        };
        let mut config = ApiConfig::default();
        config.modules = vec![module.clone(), module];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }
}
