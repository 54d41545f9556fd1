//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! Values are resolved once at startup by [`crate::config::loader`] and are
//! immutable afterwards.

use std::path::PathBuf;

use crate::routing::{Backend, Route, RouteError, RouteTable};

/// Path prefix reserved for the tunnel server's control endpoint.
pub const ADMIN_PREFIX: &str = "/~!frp";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Public listener settings.
    pub listener: ListenerConfig,

    /// Tunnel server (frps) settings. Both backends live here.
    pub tunnel: TunnelConfig,

    /// Access log settings.
    pub access_log: AccessLogConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Build the route table: the admin prefix first, then the catch-all.
    pub fn routes(&self) -> Result<RouteTable, RouteError> {
        let mut table = RouteTable::new();
        table.register(Route::new(
            ADMIN_PREFIX,
            self.tunnel.entry_backend(),
            ADMIN_PREFIX,
        )?);
        table.register(Route::new("/", self.tunnel.proxy_backend(), "")?);
        Ok(table)
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Bind address without port (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Public port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// `address:port` form used for binding.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
        }
    }
}

/// Settings handed to the tunnel server. The gateway itself only uses the
/// bind addresses and ports to reach its two backends.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Path (or name on `PATH`) of the frps executable.
    pub binary: PathBuf,

    /// Shared secret for tunnel clients. Opaque to the gateway.
    pub token: String,

    /// Address the control endpoint binds to.
    pub entry_bind_address: String,

    /// Control endpoint port.
    pub entry_port: u16,

    /// Address proxied client ports bind to.
    pub proxy_bind_address: String,

    /// The single port tunnel clients may expose.
    pub proxy_port: u16,

    /// Seconds to wait for the control endpoint to accept connections.
    pub ready_timeout_secs: u64,
}

impl TunnelConfig {
    /// Control/admin backend.
    pub fn entry_backend(&self) -> Backend {
        Backend::http(self.entry_bind_address.clone(), self.entry_port)
    }

    /// Data/proxy backend.
    pub fn proxy_backend(&self) -> Backend {
        Backend::http(self.proxy_bind_address.clone(), self.proxy_port)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("frps"),
            token: "hello-frps".to_string(),
            entry_bind_address: "127.0.0.1".to_string(),
            entry_port: 7000,
            proxy_bind_address: "127.0.0.1".to_string(),
            proxy_port: 7001,
            ready_timeout_secs: 10,
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessLogConfig {
    /// Paths (exact match) that never produce an access log entry.
    pub skip_paths: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log output configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_put_admin_prefix_first() {
        let config = GatewayConfig::default();
        let routes = config.routes().unwrap();

        let admin = routes.match_path("/~!frp/status").unwrap();
        assert_eq!(admin.backend().authority(), "127.0.0.1:7000");
        assert_eq!(admin.rewrite_path("/~!frp/status"), "/status");

        let proxy = routes.match_path("/dashboard").unwrap();
        assert_eq!(proxy.backend().authority(), "127.0.0.1:7001");
        assert_eq!(proxy.rewrite_path("/dashboard"), "/dashboard");
    }

    #[test]
    fn listener_socket_address() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.socket_address(), "0.0.0.0:8080");
    }
}
