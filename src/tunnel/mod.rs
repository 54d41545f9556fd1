//! Tunnel server collaborator.
//!
//! The gateway fronts a tunnel server whose control and data endpoints only
//! listen on loopback. The coordinator drives it through [`TunnelServer`];
//! [`frps::FrpsProcess`] is the production implementation.
//!
//! # Lifecycle
//! ```text
//! start ──▶ (ready) ──run──▶ (exited)
//!                │
//!                └──close──▶ (stopped, resources released)
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

pub mod frps;

pub use frps::{FrpsConfig, FrpsHandle, FrpsProcess};

/// Error type for tunnel server operations.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("failed to write tunnel config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render tunnel config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tunnel server exited before becoming ready ({0})")]
    ExitedEarly(String),
    #[error("tunnel server not ready after {0:?}")]
    NotReady(Duration),
    #[error("tunnel server did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// A tunnel server the gateway depends on.
///
/// `start` returns once the server accepts connections. `run` resolves when
/// the server stops on its own or after `close`. `close` must be safe to call
/// while `run` is pending.
pub trait TunnelServer: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    fn start(&self) -> impl Future<Output = Result<Self::Handle, TunnelError>> + Send;

    fn run(&self, handle: Self::Handle) -> impl Future<Output = ()> + Send;

    fn close(&self, handle: &Self::Handle) -> impl Future<Output = Result<(), TunnelError>> + Send;
}
