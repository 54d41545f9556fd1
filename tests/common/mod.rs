//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::Message;

use frp_gateway::observability::{AccessLogger, MemorySink};
use frp_gateway::routing::RouteTable;
use frp_gateway::{GatewayServer, ServerHandle};

/// What a recording backend saw.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path_and_query: String,
    pub host: Option<String>,
    pub forwarded_for: Option<String>,
    pub connection: Option<String>,
    pub body: Vec<u8>,
}

pub type Recordings = Arc<Mutex<Vec<Recorded>>>;

#[derive(Clone)]
struct RecordingState {
    name: &'static str,
    log: Recordings,
}

async fn record(State(state): State<RecordingState>, request: Request) -> &'static str {
    let (parts, body) = request.into_parts();
    let header_value = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let host = header_value("host");
    let forwarded_for = header_value("x-forwarded-for");
    let connection = header_value("connection");
    let method = parts.method.to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.to_string())
        .unwrap_or_default();
    let body = to_bytes(body, usize::MAX)
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();

    state.log.lock().unwrap().push(Recorded {
        method,
        path_and_query,
        host,
        forwarded_for,
        connection,
        body,
    });
    state.name
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Backend answering every request with `name` and recording what it saw.
pub async fn start_recording_backend(name: &'static str) -> (SocketAddr, Recordings) {
    let log = Recordings::default();
    let app = Router::new().fallback(record).with_state(RecordingState {
        name,
        log: log.clone(),
    });
    (serve(app).await, log)
}

/// Backend answering every request with a fixed status and body.
pub async fn start_status_backend(status: u16, body: &'static str) -> SocketAddr {
    let status = StatusCode::from_u16(status).unwrap();
    let app = Router::new().fallback(move || async move { (status, body).into_response() });
    serve(app).await
}

/// Backend that waits `delay` before answering.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        Response::new(Body::from("slow"))
    });
    serve(app).await
}

/// WebSocket backend echoing every data frame. Records handshake paths.
pub async fn start_echo_ws_backend() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let paths = Arc::new(Mutex::new(Vec::new()));

    let recorded = paths.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let callback = |request: &WsRequest, response: WsResponse| {
                    recorded.lock().unwrap().push(request.uri().to_string());
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    (addr, paths)
}

/// WebSocket backend that sends one greeting and closes.
pub async fn start_closing_ws_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let _ = ws.send(Message::text("bye")).await;
                let _ = ws.close(None).await;
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    addr
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    closed_ports::<1>()[0]
}

/// `N` distinct loopback ports with nothing listening on them.
pub fn closed_ports<const N: usize>() -> [u16; N] {
    // All held at once so the OS cannot hand out the same port twice.
    let held: Vec<_> = (0..N)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    std::array::from_fn(|i| held[i].local_addr().unwrap().port())
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(routes: RouteTable) -> (ServerHandle, Arc<MemorySink>) {
    start_gateway_with_limit(routes, 128).await
}

/// Start a gateway accepting at most `max_connections` at once.
pub async fn start_gateway_with_limit(
    routes: RouteTable,
    max_connections: usize,
) -> (ServerHandle, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let logger = AccessLogger::new(sink.clone(), Vec::<String>::new());
    let handle = GatewayServer::new(routes, logger, max_connections)
        .listen("127.0.0.1:0")
        .await
        .unwrap();
    (handle, sink)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
