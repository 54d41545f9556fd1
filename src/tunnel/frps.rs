//! frps child process.
//!
//! # Responsibilities
//! - Render the frps TOML configuration from [`TunnelConfig`]
//! - Spawn `frps -c <file>` and forward its output into `tracing`
//! - Report readiness once the control port accepts TCP connections
//! - Stop the child and remove the configuration file on close

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use crate::config::TunnelConfig;
use crate::tunnel::{TunnelError, TunnelServer};

const READY_POLL: Duration = Duration::from_millis(100);
const STOP_WAIT: Duration = Duration::from_secs(5);

/// frps server configuration, serialized with frps' own key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrpsConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    pub proxy_bind_addr: String,
    pub max_ports_per_client: u32,
    pub allow_ports: Vec<PortRange>,
    pub auth: AuthConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub single: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthConfig {
    pub method: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    pub tcp_mux: bool,
    pub max_pool_count: u32,
    pub tcp_mux_keepalive_interval: u64,
    pub tcp_keepalive: u64,
    pub heartbeat_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    pub to: String,
    pub level: String,
    pub disable_print_color: bool,
}

impl FrpsConfig {
    /// One control port, one allowed proxy port, token auth.
    pub fn from_tunnel(config: &TunnelConfig) -> Self {
        Self {
            bind_addr: config.entry_bind_address.clone(),
            bind_port: config.entry_port,
            proxy_bind_addr: config.proxy_bind_address.clone(),
            max_ports_per_client: 1,
            allow_ports: vec![PortRange {
                single: config.proxy_port,
            }],
            auth: AuthConfig {
                method: "token".to_string(),
                token: config.token.clone(),
            },
            transport: TransportConfig {
                tcp_mux: true,
                max_pool_count: 10,
                tcp_mux_keepalive_interval: 30,
                tcp_keepalive: 60,
                heartbeat_timeout: 90,
            },
            log: LogConfig {
                to: "console".to_string(),
                level: "info".to_string(),
                disable_print_color: true,
            },
        }
    }

    pub fn render(&self) -> Result<String, TunnelError> {
        Ok(toml::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Exited(Option<ExitStatus>),
}

impl ProcessState {
    fn is_exited(&self) -> bool {
        matches!(self, ProcessState::Exited(_))
    }
}

/// A started frps process.
#[derive(Debug, Clone)]
pub struct FrpsHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    state: watch::Receiver<ProcessState>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl FrpsHandle {
    fn request_stop(&self) {
        let stop = match self.inner.stop.lock() {
            Ok(mut stop) => stop.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }

    async fn wait_exited(&self) -> Option<ExitStatus> {
        let mut state = self.inner.state.clone();
        match state.wait_for(ProcessState::is_exited).await.map(|s| *s) {
            Ok(ProcessState::Exited(status)) => status,
            _ => None,
        }
    }
}

/// Supervises frps as a child process.
#[derive(Debug, Clone)]
pub struct FrpsProcess {
    config: TunnelConfig,
    config_path: PathBuf,
}

impl FrpsProcess {
    pub fn new(config: TunnelConfig) -> Self {
        let config_path =
            std::env::temp_dir().join(format!("frp-gateway-frps-{}.toml", std::process::id()));
        Self {
            config,
            config_path,
        }
    }

    /// Write the rendered configuration to `path` instead of the temp directory.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    fn entry_address(&self) -> String {
        format!("{}:{}", self.config.entry_bind_address, self.config.entry_port)
    }

    async fn write_config(&self) -> Result<(), TunnelError> {
        let rendered = FrpsConfig::from_tunnel(&self.config).render()?;
        let config_err = |source| TunnelError::Config {
            path: self.config_path.clone(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.config_path).await.map_err(config_err)?;
        file.write_all(rendered.as_bytes()).await.map_err(config_err)?;
        file.flush().await.map_err(config_err)?;
        Ok(())
    }

    async fn remove_config(&self) {
        match tokio::fs::remove_file(&self.config_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.config_path.display(),
                error = %e,
                "Failed to remove frps config"
            ),
        }
    }

    fn spawn(&self) -> Result<Child, TunnelError> {
        Command::new(&self.config.binary)
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                binary: self.config.binary.clone(),
                source,
            })
    }

    async fn wait_ready(
        &self,
        mut state: watch::Receiver<ProcessState>,
    ) -> Result<(), TunnelError> {
        let timeout = Duration::from_secs(self.config.ready_timeout_secs);
        let addr = self.entry_address();

        let ready = tokio::time::timeout(timeout, async {
            loop {
                let current = *state.borrow_and_update();
                if let ProcessState::Exited(status) = current {
                    return Err(TunnelError::ExitedEarly(describe(status)));
                }
                if TcpStream::connect(&addr).await.is_ok() {
                    return Ok(());
                }
                tokio::select! {
                    _ = tokio::time::sleep(READY_POLL) => {}
                    _ = state.changed() => {}
                }
            }
        })
        .await;

        match ready {
            Ok(result) => result,
            Err(_) => Err(TunnelError::NotReady(timeout)),
        }
    }
}

impl TunnelServer for FrpsProcess {
    type Handle = FrpsHandle;

    async fn start(&self) -> Result<FrpsHandle, TunnelError> {
        self.write_config().await?;

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.remove_config().await;
                return Err(e);
            }
        };
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_output(stdout, Output::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_output(stderr, Output::Stderr));
        }

        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(supervise(child, stop_rx, state_tx));

        let handle = FrpsHandle {
            inner: Arc::new(HandleInner {
                state: state_rx.clone(),
                stop: Mutex::new(Some(stop_tx)),
            }),
        };

        tracing::info!(
            pid = ?pid,
            binary = %self.config.binary.display(),
            entry = %self.entry_address(),
            "frps spawned, waiting for readiness"
        );

        if let Err(e) = self.wait_ready(state_rx).await {
            if let Err(close_err) = self.close(&handle).await {
                tracing::warn!(error = %close_err, "Failed to stop frps after failed start");
            }
            return Err(e);
        }

        tracing::info!(entry = %self.entry_address(), "frps ready");
        Ok(handle)
    }

    async fn run(&self, handle: FrpsHandle) {
        let status = handle.wait_exited().await;
        tracing::info!(status = %describe(status), "frps exited");
    }

    async fn close(&self, handle: &FrpsHandle) -> Result<(), TunnelError> {
        handle.request_stop();
        let stopped = tokio::time::timeout(STOP_WAIT, handle.wait_exited())
            .await
            .is_ok();
        self.remove_config().await;

        if stopped {
            Ok(())
        } else {
            Err(TunnelError::StopTimeout(STOP_WAIT))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Output {
    Stdout,
    Stderr,
}

async fn pipe_output<R>(reader: R, output: Output)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match output {
                Output::Stdout => tracing::info!(target: "frps", "{}", line),
                Output::Stderr => tracing::warn!(target: "frps", "{}", line),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "frps output closed");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    stop: oneshot::Receiver<()>,
    state: watch::Sender<ProcessState>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = stop => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill frps");
            }
            child.wait().await
        }
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for frps");
            None
        }
    };
    state.send_replace(ProcessState::Exited(status));
}

fn describe(status: Option<ExitStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "unknown status".to_string(),
    }
}
