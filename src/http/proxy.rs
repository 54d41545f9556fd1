//! Request dispatch: route, classify, forward.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;

use crate::http::forward::HttpForwarder;
use crate::http::request::{classify, RequestKind};
use crate::http::response::not_found;
use crate::http::websocket::StreamRelay;
use crate::routing::{Route, RouteTable};

/// Composes the standard forwarder and the stream relay.
#[derive(Clone)]
pub struct Forwarder {
    http: HttpForwarder,
    stream: StreamRelay,
}

impl Forwarder {
    pub fn new(http: HttpForwarder, stream: StreamRelay) -> Self {
        Self { http, stream }
    }

    pub async fn forward(&self, route: &Route, request: Request<Body>) -> Response {
        match classify(request.headers()) {
            RequestKind::Standard => self.http.forward(route, request).await,
            RequestKind::Upgrade => self.stream.forward(route, request).await,
        }
    }
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub forwarder: Forwarder,
}

/// Fallback handler for every request.
pub async fn dispatch(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let Some(route) = state.routes.match_path(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        return not_found();
    };

    tracing::trace!(
        prefix = route.prefix(),
        backend = %route.backend().authority(),
        "Route matched"
    );
    state.forwarder.forward(route, request).await
}
