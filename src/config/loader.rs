//! Configuration resolution from environment-style settings.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve configuration from the process environment.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    load_with(|key| std::env::var(key).ok())
}

/// Resolve and validate configuration from `lookup`.
///
/// Empty values are treated as unset. Every setting has a default.
pub fn load_with<F>(lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let mut config = GatewayConfig::default();

    if let Some(addr) = get("BIND_ADDR") {
        config.listener.bind_address = addr;
    }
    if let Some(port) = parse(&get, "PORT")? {
        config.listener.port = port;
    }
    if let Some(max) = parse(&get, "MAX_CONNECTIONS")? {
        config.listener.max_connections = max;
    }

    if let Some(port) = parse(&get, "FRPS")? {
        config.tunnel.entry_port = port;
    }
    if let Some(port) = parse(&get, "PROXY")? {
        config.tunnel.proxy_port = port;
    }
    if let Some(token) = get("TOKEN") {
        config.tunnel.token = token;
    }
    if let Some(bin) = get("FRPS_BIN") {
        config.tunnel.binary = PathBuf::from(bin);
    }
    if let Some(secs) = parse(&get, "FRPS_READY_TIMEOUT")? {
        config.tunnel.ready_timeout_secs = secs;
    }

    if let Some(paths) = get("ACCESS_LOG_SKIP") {
        config.access_log.skip_paths = paths
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(filter) = get("RUST_LOG") {
        config.logging.filter = filter;
    }
    if let Some(format) = get("LOG_FORMAT") {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    value: format,
                    reason: "expected `text` or `json`".to_string(),
                })
            }
        };
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_with(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.tunnel.entry_port, 7000);
        assert_eq!(config.tunnel.proxy_port, 7001);
        assert_eq!(config.tunnel.token, "hello-frps");
        assert!(config.access_log.skip_paths.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("FRPS", "7100"),
            ("PROXY", "7200"),
            ("TOKEN", "s3cret"),
            ("ACCESS_LOG_SKIP", "/healthz, /ready"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.tunnel.entry_port, 7100);
        assert_eq!(config.tunnel.proxy_port, 7200);
        assert_eq!(config.tunnel.token, "s3cret");
        assert_eq!(config.access_log.skip_paths, vec!["/healthz", "/ready"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn empty_value_means_unset() {
        let config = load(&[("PORT", ""), ("TOKEN", "")]).unwrap();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.tunnel.token, "hello-frps");
    }

    #[test]
    fn unparseable_port_is_fatal() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }

    #[test]
    fn unknown_log_format_is_fatal() {
        let err = load(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LOG_FORMAT", .. }));
    }

    #[test]
    fn validation_errors_surface() {
        let err = load(&[("FRPS", "7001"), ("PROXY", "7001")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
