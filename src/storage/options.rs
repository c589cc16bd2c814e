//! Typed backend options.
//!
//! The configuration keeps backend options as a loose key → value map so new
//! drivers can add keys without schema changes. Before connecting, the known
//! keys are converted into [`ConnectOptions`]; a value of the wrong kind is
//! rejected with the offending value in the error.

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use toml::Value;

use crate::config::duration::parse_duration;

/// Error converting one option value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert field: {value} to {target}")]
pub struct OptionError {
    /// Option key.
    pub field: String,
    /// Offending value as written.
    pub value: String,
    /// Expected kind.
    pub target: &'static str,
}

/// Backend options with their typed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub query_timeout: Duration,
    pub redis_cluster: bool,
    pub redis_cluster_sync: Duration,
    pub redis_cluster_ondown_delay: Duration,
    pub redis_sentinel: String,
    pub redis_tls: bool,
    pub redis_client_certificate: String,
    pub redis_client_key: String,
    pub redis_ca_certificate: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            redis_cluster: false,
            redis_cluster_sync: Duration::from_secs(5),
            redis_cluster_ondown_delay: Duration::ZERO,
            redis_sentinel: String::new(),
            redis_tls: false,
            redis_client_certificate: String::new(),
            redis_client_key: String::new(),
            redis_ca_certificate: String::new(),
        }
    }
}

impl ConnectOptions {
    /// Convert a loose option map. Missing keys keep their defaults and
    /// unknown keys are ignored.
    pub fn from_opts(opts: &BTreeMap<String, Value>) -> Result<Self, OptionError> {
        let mut options = Self::default();
        for (key, value) in opts {
            match key.as_str() {
                "query_timeout" => options.query_timeout = as_duration(key, value)?,
                "redis_cluster" => options.redis_cluster = as_bool(key, value)?,
                "redis_cluster_sync" => options.redis_cluster_sync = as_duration(key, value)?,
                "redis_cluster_ondown_delay" => {
                    options.redis_cluster_ondown_delay = as_duration(key, value)?
                }
                "redis_sentinel" => options.redis_sentinel = as_string(key, value)?,
                "redis_tls" => options.redis_tls = as_bool(key, value)?,
                "redis_client_certificate" => {
                    options.redis_client_certificate = as_string(key, value)?
                }
                "redis_client_key" => options.redis_client_key = as_string(key, value)?,
                "redis_ca_certificate" => options.redis_ca_certificate = as_string(key, value)?,
                _ => tracing::debug!(option = %key, "Ignoring unknown data store option"),
            }
        }
        Ok(options)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn conversion_error(field: &str, value: &Value, target: &'static str) -> OptionError {
    OptionError {
        field: field.to_string(),
        value: display(value),
        target,
    }
}

fn as_duration(field: &str, value: &Value) -> Result<Duration, OptionError> {
    match value {
        Value::String(s) => parse_duration(s).map_err(|_| conversion_error(field, value, "duration")),
        Value::Integer(nanos) if *nanos >= 0 => Ok(Duration::from_nanos(*nanos as u64)),
        _ => Err(conversion_error(field, value, "duration")),
    }
}

fn as_bool(field: &str, value: &Value) -> Result<bool, OptionError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::String(s) => s.parse().map_err(|_| conversion_error(field, value, "bool")),
        _ => Err(conversion_error(field, value, "bool")),
    }
}

fn as_string(field: &str, value: &Value) -> Result<String, OptionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => Ok(value.to_string()),
        _ => Err(conversion_error(field, value, "string")),
    }
}
