//! frp-gateway
//!
//! ```text
//!                      ┌──────────────────────────────────────────┐
//!                      │                 GATEWAY                  │
//!   Client request     │  ┌─────────┐   ┌─────────┐   ┌────────┐  │
//!   ───────────────────┼─▶│   net   │──▶│  http   │──▶│routing │  │
//!                      │  │listener │   │ server  │   │ table  │  │
//!                      │  └─────────┘   └─────────┘   └───┬────┘  │
//!                      │                 /~!frp/*         │  /*   │
//!                      │             ┌────────────────────┴───┐   │
//!                      └─────────────┼────────────────────────┼───┘
//!                                    ▼                        ▼
//!                             frps control               frps proxy
//!                             127.0.0.1:FRPS             127.0.0.1:PROXY
//! ```

use std::process::ExitCode;

use clap::Parser;

use frp_gateway::config::{self, GatewayConfig};
use frp_gateway::lifecycle::{Coordinator, TerminationSignals};
use frp_gateway::observability::logging;
use frp_gateway::tunnel::FrpsProcess;

#[derive(Parser)]
#[command(name = "frp-gateway")]
#[command(about = "Multiplexes the frps control and proxy endpoints behind one port", long_about = None)]
struct Cli {
    /// Resolve and validate configuration, print it, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("frp-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        print_summary(&config);
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("frp-gateway: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "frp-gateway starting");
    tracing::info!(
        address = %config.listener.socket_address(),
        max_connections = config.listener.max_connections,
        frps_port = config.tunnel.entry_port,
        proxy_port = config.tunnel.proxy_port,
        "Configuration loaded"
    );

    let mut signals = match TerminationSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };
    let termination = async move {
        let signal = signals.recv().await;
        tracing::warn!(signal, "Interruption signal received");
    };

    let tunnel = FrpsProcess::new(config.tunnel.clone());
    match Coordinator::new(config, tunnel).run(termination).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "frp-gateway stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn print_summary(config: &GatewayConfig) {
    println!("listen            {}", config.listener.socket_address());
    println!("max connections   {}", config.listener.max_connections);
    println!(
        "frps control      {}:{}",
        config.tunnel.entry_bind_address, config.tunnel.entry_port
    );
    println!(
        "frps proxy        {}:{}",
        config.tunnel.proxy_bind_address, config.tunnel.proxy_port
    );
    println!("frps binary       {}", config.tunnel.binary.display());
    println!("frps ready wait   {}s", config.tunnel.ready_timeout_secs);
    println!("token             <redacted>");
    println!("access log skip   {:?}", config.access_log.skip_paths);
    println!(
        "log               {} ({:?})",
        config.logging.filter, config.logging.format
    );
}
