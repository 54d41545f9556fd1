//! frp-gateway: a single public port in front of frps.
//!
//! Requests under `/~!frp` reach the frps control endpoint with the prefix
//! stripped. Everything else reaches the frps proxy endpoint. WebSocket
//! upgrades are relayed frame by frame.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Collaborators
pub mod tunnel;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use http::{GatewayServer, ServerHandle};
pub use lifecycle::{Coordinator, Shutdown};
pub use tunnel::{FrpsProcess, TunnelServer};
