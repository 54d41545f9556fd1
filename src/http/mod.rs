//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper-util auto builder, access log, panic guard)
//!     → proxy.rs (route lookup, protocol detection)
//!     → forward.rs (request/response exchange)
//!       or websocket.rs (upgrade, frame relay)
//!     → response.rs (hop-by-hop cleanup, error marker)
//!     → Send to client
//! ```

pub mod forward;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use proxy::{dispatch, Forwarder, GatewayState};
pub use request::{classify, RequestKind};
pub use response::ForwardError;
pub use server::{GatewayServer, ServerError, ServerHandle, ServerState, ShutdownReport};
