//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation after values are parsed
//! - Validate value ranges (ports non-zero, limits positive)
//! - Detect conflicting internal ports
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::GatewayConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be 0")]
    ZeroPort(&'static str),
    #[error("tunnel entry and proxy ports are both {0}")]
    PortConflict(u16),
    #[error("max_connections must be at least 1")]
    NoConnections,
    #[error("tunnel token must not be empty")]
    EmptyToken,
    #[error("{0} must not be empty")]
    EmptyAddress(&'static str),
}

/// Check a resolved configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, port) in [
        ("listener port", config.listener.port),
        ("tunnel entry port", config.tunnel.entry_port),
        ("tunnel proxy port", config.tunnel.proxy_port),
    ] {
        if port == 0 {
            errors.push(ValidationError::ZeroPort(name));
        }
    }

    if config.tunnel.entry_port != 0 && config.tunnel.entry_port == config.tunnel.proxy_port {
        errors.push(ValidationError::PortConflict(config.tunnel.entry_port));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }

    if config.tunnel.token.is_empty() {
        errors.push(ValidationError::EmptyToken);
    }

    for (name, addr) in [
        ("listener bind address", &config.listener.bind_address),
        ("tunnel entry bind address", &config.tunnel.entry_bind_address),
        ("tunnel proxy bind address", &config.tunnel.proxy_bind_address),
    ] {
        if addr.is_empty() {
            errors.push(ValidationError::EmptyAddress(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
