//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → access_log.rs (middleware builds one AccessLogEntry)
//!     → AccessLogSink (tracing events by default)
//!
//! Everything else:
//!     → tracing macros → subscriber installed by logging.rs
//! ```
//!
//! # Design Decisions
//! - Severity is decided where the entry is built, never parsed back from text
//! - The sink is injected so tests can capture entries

pub mod access_log;
pub mod logging;

pub use access_log::{
    AccessLogEntry, AccessLogSink, AccessLogger, MemorySink, Severity, TracingSink, CANCELLED,
};
