//! rpc-dispatch — JSON-RPC 2.0 server
//!
//! Serves the demo API over WebSocket (`/ws`) and HTTP (`/rpc`).
//!
//! Usage:
//!   rpc-dispatch                          # Default port 7070
//!   rpc-dispatch --port 8080              # Custom port
//!   rpc-dispatch --reject-duplicates      # Fail on duplicate method names
//!   rpc-dispatch --log-file               # Log to ~/.rpc-dispatch/logs/rpc.log

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rpc_server::{MethodRegistry, RegistrationPolicy, RpcServer};
use rpc_transport::{TransportConfig, TransportServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rpc-dispatch", about = "JSON-RPC 2.0 dispatch server")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent WebSocket connections
    #[arg(long, default_value = "32")]
    max_connections: usize,

    /// Enable permissive CORS on the HTTP endpoints
    #[arg(long)]
    cors: bool,

    /// Reject duplicate method registrations instead of overwriting
    #[arg(long)]
    reject_duplicates: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.rpc-dispatch/logs/rpc.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn init_tracing(cli: &Cli) -> Result<(), std::io::Error> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_file_arg) = cli.log_file.as_deref() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(&home).join(".rpc-dispatch/logs/rpc.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("Failed to open log file: {e}");
        std::process::exit(1);
    }

    let policy = if cli.reject_duplicates {
        RegistrationPolicy::Reject
    } else {
        RegistrationPolicy::Overwrite
    };
    let registry = Arc::new(MethodRegistry::with_policy(policy));

    let server = match RpcServer::from_current(registry.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = demo::bind(&registry, server.callbacks()) {
        error!("Failed to bind demo API: {e}");
        std::process::exit(1);
    }

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_connections: Some(cli.max_connections),
        verbose_logging: cli.verbose,
    };

    let mut transport = match TransportServer::start(config, server).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let port = transport.port();
    println!();
    println!("  rpc-dispatch running");
    println!();
    println!("  WebSocket:  ws://{}:{port}/ws", cli.hostname);
    println!("  HTTP:       http://{}:{port}/rpc", cli.hostname);
    println!("  Methods:    {}", registry.method_names().join(", "));
    println!("  Policy:     {policy:?} on duplicate names");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }

    info!("Shutting down");
    transport.stop().await;
    println!("  Server stopped.");
}
