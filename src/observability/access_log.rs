//! Structured access log.
//!
//! Every request passes through [`access_log`], which builds one
//! [`AccessLogEntry`] after the inner handler completes and hands it to the
//! configured [`AccessLogSink`]. A request whose handler is dropped before it
//! responds is still logged once, as [`CANCELLED`]. Severity is decided here,
//! from the status code, and travels with the entry.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::request::{client_ip, peer_addr};
use crate::http::response::ForwardError;

/// Log level of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Severity::Error
        } else if status.is_client_error() {
            Severity::Warn
        } else {
            Severity::Info
        }
    }
}

/// A single access log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub client_ip: Option<IpAddr>,
    pub method: Method,
    /// Request path as received, before any rewrite.
    pub path: String,
    pub status: StatusCode,
    pub user_agent: String,
    /// Wall-clock handling time, rounded up.
    pub latency_ms: u64,
    pub severity: Severity,
    /// Internal failure reported by the forwarder, if any.
    pub error: Option<String>,
}

impl fmt::Display for AccessLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return f.write_str(error);
        }
        match &self.client_ip {
            Some(ip) => write!(f, "{}", ip)?,
            None => f.write_str("-")?,
        }
        write!(
            f,
            " - \"{} {}\" {} \"{}\" ({} ms)",
            self.method,
            self.path,
            self.status.as_u16(),
            self.user_agent,
            self.latency_ms
        )
    }
}

/// Destination for access log entries.
pub trait AccessLogSink: Send + Sync + 'static {
    fn record(&self, entry: AccessLogEntry);
}

/// Emits entries as `tracing` events on the `access_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AccessLogSink for TracingSink {
    fn record(&self, entry: AccessLogEntry) {
        macro_rules! emit {
            ($level:ident) => {
                tracing::$level!(
                    target: "access_log",
                    client_ip = %entry.client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".into()),
                    method = %entry.method,
                    path = %entry.path,
                    status = entry.status.as_u16(),
                    latency_ms = entry.latency_ms,
                    user_agent = %entry.user_agent,
                    "{}",
                    entry
                )
            };
        }
        match entry.severity {
            Severity::Info => emit!(info),
            Severity::Warn => emit!(warn),
            Severity::Error => emit!(error),
        }
    }
}

/// Keeps entries in memory. Used to inspect logging in tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AccessLogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AccessLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AccessLogSink for MemorySink {
    fn record(&self, entry: AccessLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Access log state shared by the middleware.
#[derive(Clone)]
pub struct AccessLogger {
    sink: Arc<dyn AccessLogSink>,
    skip: Arc<HashSet<String>>,
}

impl AccessLogger {
    pub fn new(sink: Arc<dyn AccessLogSink>, skip_paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            sink,
            skip: Arc::new(skip_paths.into_iter().collect()),
        }
    }

    /// Exact-match check against the exclusion set.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip.contains(path)
    }

    pub fn record(&self, entry: AccessLogEntry) {
        self.sink.record(entry);
    }
}

impl fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogger")
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// Milliseconds, rounded up.
pub fn latency_ms(elapsed: Duration) -> u64 {
    elapsed.as_nanos().div_ceil(1_000_000) as u64
}

/// Error text of an entry whose handler never produced a response.
pub const CANCELLED: &str = "request cancelled before completion";

/// Status logged for a cancelled request (client closed request).
fn cancelled_status() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// Entry fields captured before the handler runs.
///
/// Dropping it without [`PendingEntry::complete`] means the handler future
/// was dropped (client gone, connection force-closed) and records the
/// request as cancelled.
struct PendingEntry {
    logger: AccessLogger,
    start: Instant,
    client_ip: Option<IpAddr>,
    method: Method,
    path: String,
    user_agent: String,
    recorded: bool,
}

impl PendingEntry {
    fn new(logger: AccessLogger, request: &Request) -> Self {
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Self {
            logger,
            start: Instant::now(),
            client_ip: client_ip(request.headers(), peer_addr(request)),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            user_agent,
            recorded: false,
        }
    }

    fn complete(mut self, response: &Response) {
        let error = response
            .extensions()
            .get::<ForwardError>()
            .map(ToString::to_string);
        self.record(response.status(), error);
    }

    fn record(&mut self, status: StatusCode, error: Option<String>) {
        self.recorded = true;
        if self.logger.is_skipped(&self.path) {
            return;
        }

        let severity = if error.is_some() {
            Severity::Error
        } else {
            Severity::from_status(status)
        };
        self.logger.record(AccessLogEntry {
            client_ip: self.client_ip,
            method: self.method.clone(),
            path: std::mem::take(&mut self.path),
            status,
            user_agent: std::mem::take(&mut self.user_agent),
            latency_ms: latency_ms(self.start.elapsed()),
            severity,
            error,
        });
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if !self.recorded {
            self.record(cancelled_status(), Some(CANCELLED.to_string()));
        }
    }
}

/// Middleware recording one entry per request.
pub async fn access_log(State(logger): State<AccessLogger>, request: Request, next: Next) -> Response {
    let pending = PendingEntry::new(logger, &request);
    let response = next.run(request).await;
    pending.complete(&response);
    response
}
