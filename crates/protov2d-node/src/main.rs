// ============================================
// File: crates/protov2d-node/src/main.rs
// ============================================
//! # ProtoV2d Server Entry Point
//!
//! ## Creation Reason
//! Thin binary around the server endpoint: CLI parsing, logging
//! setup, configuration loading, TCP serve loop.
//!
//! ## Usage
//! ```bash
//! protov2d-server start --config /etc/protov2d/server.toml
//! protov2d-server validate --config /etc/protov2d/server.toml
//! ```
//!
//! Root keypair generation is a deployment task handled outside this
//! binary; the configuration carries the hex-serialized pair.
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use protov2d_node::{ServerConfig, ServerEvent, SessionEvent};

// ============================================
// CLI Definition
// ============================================

/// ProtoV2d tunnel server
#[derive(Parser, Debug)]
#[command(name = "protov2d-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "/etc/protov2d/server.toml")]
        config: PathBuf,
    },

    /// Validate the configuration file
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "/etc/protov2d/server.toml")]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Start { config } => cmd_start(config).await,
        Commands::Validate { config } => cmd_validate(config).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

async fn cmd_start(config_path: PathBuf) -> protov2d_node::Result<()> {
    let config = ServerConfig::load(&config_path).await?;
    let listen_addr = config
        .listen_addr
        .ok_or_else(|| protov2d_node::NodeError::config("listen_addr is required to start"))?;

    let (server, mut events) = protov2d_node::Server::new(&config)?;

    // Surface connection lifecycle; applications embedding the crate
    // consume these streams themselves.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::Connection { session, events } => {
                    info!(session_id = %session.id(), "session connected");
                    tokio::spawn(log_session_events(events));
                }
                ServerEvent::DropConnection(session_id) => {
                    info!(%session_id, "session dropped after reconnect window");
                }
            }
        }
    });

    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| protov2d_node::NodeError::config(format!("bind {listen_addr}: {e}")))?;
    server.serve(listener).await
}

async fn log_session_events(mut events: protov2d_node::SessionEvents) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Data(payload) => info!(len = payload.len(), "payload received"),
            SessionEvent::Disconnected => info!("session disconnected, awaiting resume"),
            SessionEvent::Connected => info!("session transport attached"),
            SessionEvent::Closed => {
                info!("session closed");
                return;
            }
            _ => {}
        }
    }
}

async fn cmd_validate(config_path: PathBuf) -> protov2d_node::Result<()> {
    let config = ServerConfig::load(&config_path).await?;

    println!("Configuration is valid");
    println!();
    println!(
        "  listen_addr:     {}",
        config
            .listen_addr
            .map_or_else(|| "<injected transports>".to_string(), |a| a.to_string())
    );
    println!("  stream_timeout:  {}s", config.stream_timeout_secs);
    println!("  ping_interval:   {}s", config.ping_interval_secs);
    println!("  allow_plaintext: {}", config.allow_plaintext);

    Ok(())
}

// ============================================
// Helpers
// ============================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
