//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Complete upgrade handshake with client
//! - Establish WebSocket connection to backend
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The backend is dialed before the client is upgraded, so a refused
//!   backend is reported to the client as an HTTP response
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - A session keeps its connection's slot under the connection limit
//! - Ping/pong stay on their hop: each side's pings are answered by the
//!   WebSocket layer that received them and are not relayed
//! - No origin allow-list: every client handshake is accepted. Do not expose
//!   the gateway where untrusted browser origins can reach it.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap, HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as BackendMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::http::forward::{append_forwarded_for, set_host};
use crate::http::request::{peer_addr, X_FORWARDED_FOR};
use crate::http::response::{strip_hop_by_hop, ForwardError};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionPermit, ConnectionTracker};
use crate::routing::{Backend, Route};

pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client headers carried over to the backend handshake.
const FORWARDED_HEADERS: [HeaderName; 5] = [
    header::ORIGIN,
    header::COOKIE,
    header::AUTHORIZATION,
    header::SEC_WEBSOCKET_PROTOCOL,
    header::USER_AGENT,
];

/// Why a relay session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    BackendClosed,
    ClientError(String),
    BackendError(String),
}

/// Upgrades WebSocket requests and relays frames to the backend.
#[derive(Clone)]
pub struct StreamRelay {
    sessions: ConnectionTracker,
    force_close: Shutdown,
}

impl StreamRelay {
    /// `sessions` counts live relays; `force_close` tears them all down.
    pub fn new(sessions: ConnectionTracker, force_close: Shutdown) -> Self {
        Self {
            sessions,
            force_close,
        }
    }

    pub async fn forward(&self, route: &Route, request: Request<Body>) -> Response {
        let peer = peer_addr(&request);
        let (mut parts, _body) = request.into_parts();

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => return rejection.into_response(),
        };

        let url = route.backend().stream_url(&route.rewrite_uri(&parts.uri));
        let handshake = match backend_request(&url, route.backend(), &parts.headers, peer) {
            Ok(handshake) => handshake,
            Err(e) => {
                return ForwardError::new("invalid backend url", e.to_string())
                    .into_response_with(StatusCode::BAD_GATEWAY)
            }
        };

        let (backend, backend_response) = match connect_async(handshake).await {
            Ok(connected) => connected,
            Err(tungstenite::Error::Http(response)) => {
                tracing::debug!(url = %url, status = %response.status(), "Backend rejected handshake");
                let mut out = Response::new(
                    response
                        .body()
                        .clone()
                        .map(Body::from)
                        .unwrap_or_else(Body::empty),
                );
                *out.status_mut() = response.status();
                for (name, value) in response.headers() {
                    out.headers_mut().append(name.clone(), value.clone());
                }
                strip_hop_by_hop(out.headers_mut());
                return out;
            }
            Err(e) => {
                return ForwardError::new("backend dial failed", e.to_string())
                    .into_response_with(StatusCode::SERVICE_UNAVAILABLE)
            }
        };

        let mut upgrade = upgrade;
        if let Some(protocol) = backend_response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
        {
            upgrade = upgrade.protocols([protocol.to_owned()]);
        }

        let guard = self.sessions.track();
        let slot = parts.extensions.remove::<ConnectionPermit>();
        let mut force_close = self.force_close.subscribe();

        upgrade
            .on_failed_upgrade(|e| tracing::warn!(error = %e, "Client upgrade failed"))
            .on_upgrade(move |client| async move {
                let id = guard.id();
                tracing::debug!(session = %id, url = %url, "Session opened");
                tokio::select! {
                    end = relay(client, backend) => {
                        tracing::debug!(session = %id, end = ?end, "Session closed");
                    }
                    _ = force_close.recv() => {
                        tracing::debug!(session = %id, "Session force-closed");
                    }
                }
                drop(slot);
                drop(guard);
            })
    }
}

fn backend_request(
    url: &str,
    backend: &Backend,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<Request<()>, tungstenite::Error> {
    let mut request = url.into_client_request()?;
    let out = request.headers_mut();

    for name in FORWARDED_HEADERS.iter() {
        for value in headers.get_all(name) {
            out.append(name.clone(), value.clone());
        }
    }
    if let Some(value) = headers.get(X_FORWARDED_FOR) {
        out.insert(X_FORWARDED_FOR, value.clone());
    }
    if let Some(peer) = peer {
        append_forwarded_for(out, &peer.ip().to_string());
    }
    set_host(out, &backend.authority());

    Ok(request)
}

/// Relay frames between `client` and `backend` until either side closes.
pub async fn relay(mut client: WebSocket, mut backend: BackendStream) -> SessionEnd {
    let end = loop {
        tokio::select! {
            msg = client.recv() => match msg {
                Some(Ok(msg)) => {
                    let closing = matches!(msg, Message::Close(_));
                    if let Some(msg) = to_backend(msg) {
                        if let Err(e) = backend.send(msg).await {
                            break SessionEnd::BackendError(e.to_string());
                        }
                    }
                    if closing {
                        break SessionEnd::ClientClosed;
                    }
                }
                Some(Err(e)) => break SessionEnd::ClientError(e.to_string()),
                None => break SessionEnd::ClientClosed,
            },
            msg = backend.next() => match msg {
                Some(Ok(msg)) => {
                    let closing = matches!(msg, BackendMessage::Close(_));
                    if let Some(msg) = to_client(msg) {
                        if let Err(e) = client.send(msg).await {
                            break SessionEnd::ClientError(e.to_string());
                        }
                    }
                    if closing {
                        break SessionEnd::BackendClosed;
                    }
                }
                Some(Err(e)) => break SessionEnd::BackendError(e.to_string()),
                None => break SessionEnd::BackendClosed,
            },
        }
    };

    // Best-effort close both sides
    let _ = SinkExt::close(&mut client).await;
    let _ = backend.close(None).await;
    end
}

/// `None` for control frames that stay on the client hop.
fn to_backend(msg: Message) -> Option<BackendMessage> {
    let msg = match msg {
        Message::Text(text) => BackendMessage::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => BackendMessage::Binary(data),
        Message::Close(frame) => BackendMessage::Close(frame.map(|f| BackendCloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
        Message::Ping(_) | Message::Pong(_) => return None,
    };
    Some(msg)
}

fn to_client(msg: BackendMessage) -> Option<Message> {
    let msg = match msg {
        BackendMessage::Text(text) => Message::Text(text.as_str().to_owned().into()),
        BackendMessage::Binary(data) => Message::Binary(data),
        BackendMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
        BackendMessage::Ping(_) | BackendMessage::Pong(_) => return None,
        // Raw frames are only produced when writing.
        BackendMessage::Frame(_) => return None,
    };
    Some(msg)
}
