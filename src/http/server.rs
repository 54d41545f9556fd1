//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum Router: access log → panic guard → dispatch
//! - Accept connections and serve HTTP/1.1 and HTTP/2 with upgrades
//! - Graceful shutdown with a hard deadline
//!
//! # States
//! ```text
//! Created ──listen──▶ Listening ──shutdown──▶ ShuttingDown ──▶ Closed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::{middleware, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::GatewayConfig;
use crate::http::forward::HttpForwarder;
use crate::http::proxy::{dispatch, Forwarder, GatewayState};
use crate::http::websocket::StreamRelay;
use crate::lifecycle::{Shutdown, ShutdownListener};
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::access_log::{access_log, AccessLogSink, AccessLogger};
use crate::routing::{RouteError, RouteTable};

/// Time allowed for force-closed tasks to release their sockets.
const FORCE_CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Error type for server startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Lifecycle state of the gateway listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Closed,
}

/// Outcome of [`ServerHandle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All HTTP connections finished within the deadline.
    pub drained: bool,
    /// HTTP connections still open at the deadline.
    pub forced_connections: u64,
    /// Upgraded sessions still open at the deadline.
    pub forced_sessions: u64,
}

/// The gateway, before it starts listening.
pub struct GatewayServer {
    router: Router,
    max_connections: usize,
    sessions: ConnectionTracker,
    force_close: Shutdown,
}

impl GatewayServer {
    /// Create a new gateway with the given routes and access log.
    pub fn new(routes: RouteTable, access_log: AccessLogger, max_connections: usize) -> Self {
        let sessions = ConnectionTracker::new();
        let force_close = Shutdown::new();

        let state = GatewayState {
            routes: Arc::new(routes),
            forwarder: Forwarder::new(
                HttpForwarder::new(),
                StreamRelay::new(sessions.clone(), force_close.clone()),
            ),
        };

        Self {
            router: Self::build_router(state, access_log),
            max_connections,
            sessions,
            force_close,
        }
    }

    /// Create a gateway for `config`'s routes, logging into `sink`.
    pub fn from_config(
        config: &GatewayConfig,
        sink: Arc<dyn AccessLogSink>,
    ) -> Result<Self, RouteError> {
        let access_log = AccessLogger::new(sink, config.access_log.skip_paths.clone());
        Ok(Self::new(
            config.routes()?,
            access_log,
            config.listener.max_connections,
        ))
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: GatewayState, logger: AccessLogger) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn_with_state(logger, access_log))
    }

    /// The request handling chain, without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> ServerState {
        ServerState::Created
    }

    /// Bind `addr` and start accepting connections.
    pub async fn listen(self, addr: &str) -> Result<ServerHandle, ServerError> {
        let listener = Listener::bind(addr, self.max_connections).await?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let drain = Shutdown::new();
        let connections = ConnectionTracker::new();
        let accept = tokio::spawn(accept_loop(
            listener,
            self.router,
            connections.clone(),
            drain.clone(),
            self.force_close.clone(),
        ));

        tracing::info!(address = %local_addr, "Gateway listening");

        let (state, _) = watch::channel(ServerState::Listening);
        Ok(ServerHandle {
            local_addr,
            state,
            drain,
            force_close: self.force_close,
            connections,
            sessions: self.sessions,
            accept,
        })
    }
}

/// A running gateway.
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: watch::Sender<ServerState>,
    drain: Shutdown,
    force_close: Shutdown,
    connections: ConnectionTracker,
    sessions: ConnectionTracker,
    accept: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }

    pub fn active_sessions(&self) -> u64 {
        self.sessions.active_count()
    }

    /// Stop accepting, let in-flight requests finish for up to `deadline`,
    /// then force-close whatever is left, upgraded sessions included.
    pub async fn shutdown(self, deadline: Duration) -> ShutdownReport {
        self.state.send_replace(ServerState::ShuttingDown);
        tracing::info!(
            active_connections = self.connections.active_count(),
            active_sessions = self.sessions.active_count(),
            grace = ?deadline,
            "Gateway shutting down"
        );

        self.drain.trigger();
        if let Err(e) = self.accept.await {
            tracing::error!(error = %e, "Accept loop ended abnormally");
        }

        let drained = tokio::time::timeout(deadline, self.connections.wait_idle())
            .await
            .is_ok();
        let forced_connections = self.connections.active_count();
        let forced_sessions = self.sessions.active_count();

        if !drained {
            tracing::warn!(
                remaining = forced_connections,
                "Shutdown deadline exceeded, force-closing connections"
            );
        }
        if forced_connections > 0 || forced_sessions > 0 {
            self.force_close.trigger();
            let released = tokio::time::timeout(FORCE_CLOSE_WAIT, async {
                self.connections.wait_idle().await;
                self.sessions.wait_idle().await;
            })
            .await;
            if released.is_err() {
                tracing::error!("Connections still open after force close");
            }
        }

        self.state.send_replace(ServerState::Closed);
        tracing::info!(drained, forced_connections, forced_sessions, "Gateway closed");

        ShutdownReport {
            drained,
            forced_connections,
            forced_sessions,
        }
    }
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    connections: ConnectionTracker,
    drain: Shutdown,
    force_close: Shutdown,
) {
    let mut stop = drain.subscribe();
    loop {
        let (stream, peer, permit) = tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        let guard = connections.track();
        let router = router.clone();
        let drain = drain.subscribe();
        let force_close = force_close.subscribe();
        tokio::spawn(async move {
            tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, "Serving connection");
            serve_connection(stream, peer, permit, router, drain, force_close).await;
            drop(guard);
        });
    }

    drop(listener);
    tracing::info!("Listener closed");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    router: Router,
    mut drain: ShutdownListener,
    mut force_close: ShutdownListener,
) {
    // Each request carries the connection's slot so an upgrade can keep it.
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let mut request = request.map(Body::new);
        request.extensions_mut().insert(ConnectInfo(peer));
        request.extensions_mut().insert(permit.clone());
        router.clone().oneshot(request)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(peer_addr = %peer, error = %e, "Connection error");
                }
                break;
            }
            _ = drain.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = force_close.recv() => {
                tracing::debug!(peer_addr = %peer, "Connection force-closed");
                break;
            }
        }
    }
}
