//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (coordinator.rs):
//!     Start tunnel → Bind gateway → Run tunnel alongside
//!
//! Shutdown (coordinator.rs, shutdown.rs):
//!     Termination or tunnel exit → Stop accepting → Drain → Close tunnel
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT → Termination
//! ```
//!
//! # Design Decisions
//! - Ordered startup: tunnel first, then listener
//! - Ordered shutdown: gateway fully closed before the tunnel
//! - Shutdown has timeout: forced close after deadline

pub mod coordinator;
pub mod shutdown;
pub mod signals;

pub use coordinator::{Coordinator, LifecycleError, SHUTDOWN_GRACE};
pub use shutdown::{Shutdown, ShutdownListener};
pub use signals::TerminationSignals;
