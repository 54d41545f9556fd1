//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (route lookup, registration order)
//!     → matcher.rs (literal prefix test)
//!     → Return: matched Route or NoMatch
//!
//! Before forwarding:
//!     Route + original path
//!     → matcher.rs (strip rewrite token once)
//!     → outbound path + original query
//! ```
//!
//! # Design Decisions
//! - Routes built at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by registration)

pub mod matcher;
pub mod router;

pub use matcher::{PathPrefix, PathRewrite};
pub use router::{Backend, Route, RouteError, RouteTable};
