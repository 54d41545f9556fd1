//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment (PORT, FRPS, PROXY, TOKEN, ...)
//!     → loader.rs (lookup & parse)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed by value to the coordinator before anything is built
//! ```
//!
//! # Design Decisions
//! - Config is resolved once; components never read the environment
//! - All fields have defaults to allow an empty environment
//! - Validation separates parsing from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, load_with, ConfigError};
pub use schema::{
    AccessLogConfig, GatewayConfig, ListenerConfig, LogFormat, LoggingConfig, TunnelConfig,
    ADMIN_PREFIX,
};
pub use validation::ValidationError;
