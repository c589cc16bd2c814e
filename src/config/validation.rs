//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and formats (durations, addresses, log levels)
//! - Check the data store descriptor when a consumer needs the store
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before a file config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::duration::parse_duration;
use crate::config::schema::{sections, EngineConfig};
use crate::observability::logging::LOG_LEVELS;
use crate::storage::{ConnectOptions, DbType};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{section}] {field}: {reason}")]
pub struct ValidationError {
    pub section: &'static str,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(section: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            section,
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.general.dependency_timeout() {
        errors.push(ValidationError::new(sections::GENERAL, "dependency_timeout", e.to_string()));
    }
    if let Err(e) = config.general.shutdown_timeout() {
        errors.push(ValidationError::new(sections::GENERAL, "shutdown_timeout", e.to_string()));
    }

    if config.data_db_required() {
        if let Err(e) = config.data_db.db_type.parse::<DbType>() {
            errors.push(ValidationError::new(sections::DATA_DB, "db_type", e.to_string()));
        }
        if config.data_db.host.is_empty() {
            errors.push(ValidationError::new(sections::DATA_DB, "host", "must not be empty"));
        }
        if let Err(e) = ConnectOptions::from_opts(&config.data_db.opts) {
            errors.push(ValidationError::new(sections::DATA_DB, "opts", e.to_string()));
        }
    }

    if config.attributes.process_runs == 0 {
        errors.push(ValidationError::new(sections::ATTRIBUTES, "process_runs", "must be at least 1"));
    }

    match parse_duration(&config.analyzers.cleanup_interval) {
        Ok(interval) if interval.is_zero() && config.analyzers.enabled => {
            errors.push(ValidationError::new(sections::ANALYZERS, "cleanup_interval", "must be greater than 0"));
        }
        Ok(_) => {}
        Err(e) => {
            errors.push(ValidationError::new(sections::ANALYZERS, "cleanup_interval", e.to_string()));
        }
    }
    if let Err(e) = parse_duration(&config.analyzers.ttl) {
        errors.push(ValidationError::new(sections::ANALYZERS, "ttl", e.to_string()));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            sections::OBSERVABILITY,
            "log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            sections::OBSERVABILITY,
            "metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
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

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.general.shutdown_timeout = "soon".to_string();
        config.observability.log_level = "loud".to_string();
        config.attributes.process_runs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "shutdown_timeout"));
        assert!(errors.iter().any(|e| e.field == "log_level"));
    }

    #[test]
    fn test_data_db_checked_only_when_required() {
        let mut config = EngineConfig::default();
        config.data_db.db_type = "bad_type".to_string();
        assert!(validate_config(&config).is_ok());

        config.attributes.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "[data_db] db_type: unsupported db_type <bad_type>");
    }
}
