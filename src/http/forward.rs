//! Standard request forwarding.
//!
//! # Responsibilities
//! - Rewrite the request URI and `Host` for the selected backend
//! - Strip hop-by-hop headers, append `X-Forwarded-For`
//! - Stream the backend response back unmodified
//!
//! # Design Decisions
//! - One shared pooled client; no retries, no caching
//! - Backend HTTP errors pass through; only transport failures become 502

use std::error::Error as _;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode, Version};
use axum::response::Response;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::request::{peer_addr, X_FORWARDED_FOR};
use crate::http::response::{from_backend, strip_hop_by_hop, ForwardError};
use crate::routing::Route;

pub type HttpClient = Client<HttpConnector, Body>;

/// Forwards plain request/response exchanges.
#[derive(Clone)]
pub struct HttpForwarder {
    client: HttpClient,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Forward `request` to `route`'s backend and return its response.
    pub async fn forward(&self, route: &Route, request: Request<Body>) -> Response {
        let backend = route.backend();
        let peer = peer_addr(&request);
        let (mut parts, body) = request.into_parts();

        let path_and_query = route.rewrite_uri(&parts.uri);
        let uri = match backend.request_uri(&path_and_query) {
            Ok(uri) => uri,
            Err(e) => {
                return ForwardError::new("invalid backend uri", e.to_string())
                    .into_response_with(StatusCode::BAD_GATEWAY)
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        set_host(&mut parts.headers, &backend.authority());
        if let Some(peer) = peer {
            append_forwarded_for(&mut parts.headers, &peer.ip().to_string());
        }
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        tracing::trace!(uri = %parts.uri, "Forwarding request");

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => from_backend(response),
            Err(e) => {
                let mut message = e.to_string();
                let mut source = e.source();
                while let Some(cause) = source {
                    message.push_str(": ");
                    message.push_str(&cause.to_string());
                    source = cause.source();
                }
                ForwardError::new("backend request failed", message)
                    .into_response_with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn set_host(headers: &mut HeaderMap, authority: &str) {
    if let Ok(value) = HeaderValue::from_str(authority) {
        headers.insert(header::HOST, value);
    }
}

/// Append `ip` to any existing `X-Forwarded-For` chain.
pub(crate) fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
