//! Startup and shutdown orchestration.
//!
//! # Responsibilities
//! - Start the tunnel server, then bind the gateway in front of it
//! - Run both until termination or until the tunnel stops on its own
//! - Shut down in order: gateway drain first, tunnel close last
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener starts last (traffic only when the tunnel is ready)
//! - A tunnel close failure is logged, never fatal

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::http::{GatewayServer, ServerError};
use crate::observability::{AccessLogSink, TracingSink};
use crate::routing::RouteError;
use crate::tunnel::{TunnelError, TunnelServer};

/// Grace period for in-flight requests once termination is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for the tunnel's run task after close.
const TUNNEL_JOIN_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid routes: {0}")]
    Routes(#[from] RouteError),
    #[error("tunnel server failed to start: {0}")]
    TunnelStart(#[source] TunnelError),
    #[error("gateway failed to start: {0}")]
    Gateway(#[from] ServerError),
    #[error("tunnel server exited unexpectedly")]
    TunnelExited,
}

/// Owns the process lifecycle of the gateway and its tunnel server.
pub struct Coordinator<T: TunnelServer> {
    config: GatewayConfig,
    tunnel: Arc<T>,
    sink: Arc<dyn AccessLogSink>,
    grace: Duration,
}

impl<T: TunnelServer> Coordinator<T> {
    pub fn new(config: GatewayConfig, tunnel: T) -> Self {
        Self {
            config,
            tunnel: Arc::new(tunnel),
            sink: Arc::new(TracingSink),
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Send access log entries to `sink` instead of `tracing`.
    pub fn with_access_log_sink(mut self, sink: Arc<dyn AccessLogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Override [`SHUTDOWN_GRACE`].
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run until `termination` resolves or the tunnel exits.
    pub async fn run<F>(self, termination: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()> + Send,
    {
        let gateway = GatewayServer::from_config(&self.config, self.sink.clone())?;

        tracing::info!("Starting tunnel server");
        let handle = self
            .tunnel
            .start()
            .await
            .map_err(LifecycleError::TunnelStart)?;

        let address = self.config.listener.socket_address();
        let server = match gateway.listen(&address).await {
            Ok(server) => server,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "Failed to bind gateway");
                self.close_tunnel(&handle).await;
                return Err(e.into());
            }
        };

        let tunnel = self.tunnel.clone();
        let run_handle = handle.clone();
        let mut tunnel_task = tokio::spawn(async move { tunnel.run(run_handle).await });

        let outcome = tokio::select! {
            _ = termination => {
                tracing::warn!("Termination requested, shutting down");
                Ok(())
            }
            result = &mut tunnel_task => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Tunnel task failed");
                }
                tracing::error!("Tunnel server exited unexpectedly, shutting down");
                Err(LifecycleError::TunnelExited)
            }
        };

        let report = server.shutdown(self.grace).await;
        if !report.drained {
            tracing::warn!(
                forced_connections = report.forced_connections,
                "Gateway did not drain within the grace period"
            );
        }

        self.close_tunnel(&handle).await;

        if outcome.is_ok() {
            match tokio::time::timeout(TUNNEL_JOIN_WAIT, tunnel_task).await {
                Ok(Err(e)) => tracing::error!(error = %e, "Tunnel task failed"),
                Ok(Ok(())) => {}
                Err(_) => tracing::warn!("Tunnel task still running after close"),
            }
        }

        tracing::info!("Shutdown complete");
        outcome
    }

    async fn close_tunnel(&self, handle: &T::Handle) {
        tracing::info!("Closing tunnel server");
        if let Err(e) = self.tunnel.close(handle).await {
            tracing::error!(error = %e, "Failed to close tunnel server");
        }
    }
}
