//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Look up the matching route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (two routes in practice)
//! - Explicit NoMatch rather than silent default

use axum::http::uri::{InvalidUri, Scheme};
use axum::http::Uri;

use crate::routing::matcher::{PathPrefix, PathRewrite};

/// Error type for route construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route prefix must not be empty")]
    EmptyPrefix,
}

/// A backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Backend {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Plain HTTP backend.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new(Scheme::HTTP, host, port)
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed. Used as the outbound `Host`.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Scheme used when dialing this backend for an upgraded stream.
    pub fn stream_scheme(&self) -> &'static str {
        if self.scheme == Scheme::HTTPS {
            "wss"
        } else {
            "ws"
        }
    }

    /// Absolute request URI for `path_and_query`.
    pub fn request_uri(&self, path_and_query: &str) -> Result<Uri, InvalidUri> {
        format!("{}://{}{}", self.scheme, self.authority(), path_and_query).parse()
    }

    /// Absolute stream URL for `path_and_query`.
    pub fn stream_url(&self, path_and_query: &str) -> String {
        format!(
            "{}://{}{}",
            self.stream_scheme(),
            self.authority(),
            path_and_query
        )
    }
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    prefix: PathPrefix,
    backend: Backend,
    rewrite: PathRewrite,
}

impl Route {
    pub fn new(
        prefix: impl Into<String>,
        backend: Backend,
        rewrite: impl Into<String>,
    ) -> Result<Self, RouteError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RouteError::EmptyPrefix);
        }
        Ok(Self {
            prefix: PathPrefix::new(prefix),
            backend,
            rewrite: PathRewrite::new(rewrite),
        })
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefix.matches(path)
    }

    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrite.apply(path)
    }

    /// Rewritten path with the original query string reattached.
    pub fn rewrite_uri(&self, uri: &Uri) -> String {
        let path = self.rewrite_path(uri.path());
        match uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        }
    }
}

/// Ordered route table. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Register specific prefixes before catch-alls.
    pub fn register(&mut self, route: Route) {
        tracing::debug!(
            prefix = route.prefix(),
            backend = %route.backend().authority(),
            "Route registered"
        );
        self.routes.push(route);
    }

    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
