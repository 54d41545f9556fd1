//! Request inspection.
//!
//! # Responsibilities
//! - Classify a request as a plain exchange or a WebSocket upgrade
//! - Resolve the client address for logging and `X-Forwarded-For`
//!
//! # Design Decisions
//! - Classification is a header check only; the handshake itself belongs to
//!   the stream relay
//! - Forwarding headers are trusted for logging; the gateway is not a trust
//!   boundary

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// How a request must be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Single request/response exchange.
    Standard,
    /// WebSocket upgrade; the connection becomes a frame relay.
    Upgrade,
}

/// Classify a request by its `Upgrade` header.
pub fn classify(headers: &HeaderMap) -> RequestKind {
    let is_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if is_websocket {
        RequestKind::Upgrade
    } else {
        RequestKind::Standard
    }
}

/// The TCP peer of the connection carrying `req`, if known.
pub fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client IP: first valid `X-Forwarded-For` entry, then `X-Real-IP`, then
/// the connection peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded
        .or_else(|| {
            headers
                .get(X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .or_else(|| peer.map(|addr| addr.ip()))
}
