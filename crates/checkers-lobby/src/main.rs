//! Checkers lobby entry point.
//!
//! Loads the TOML configuration, starts the UDP discovery responder and the
//! TCP lobby, and runs until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! checkers-lobby [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --bind <IP>              Bind address for both sockets
//!   --port <PORT>            Lobby TCP port [default: 10001]
//!   --discovery-port <PORT>  Discovery UDP port [default: 10000]
//!   --no-discovery           Do not answer LAN probes
//! ```
//!
//! Command-line options override the corresponding config file values.
//! `RUST_LOG` overrides the configured `log_level`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use checkers_lobby::infrastructure::network::discovery::{
    start_probe_responder, ProbeIdentity, ProbeResponderConfig,
};
use checkers_lobby::infrastructure::network::multiplexer::Lobby;
use checkers_lobby::infrastructure::network::relay::ForwardingRelay;
use checkers_lobby::infrastructure::storage::config::{
    config_file_path, load_config_from, LobbyConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN checkers lobby.
#[derive(Debug, Parser)]
#[command(
    name = "checkers-lobby",
    about = "LAN checkers matchmaking lobby with UDP discovery",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "CHECKERS_LOBBY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the lobby and discovery sockets to.
    #[arg(long, env = "CHECKERS_LOBBY_BIND")]
    bind: Option<String>,

    /// TCP port of the lobby.
    #[arg(long, env = "CHECKERS_LOBBY_PORT")]
    port: Option<u16>,

    /// UDP port for discovery probes.
    #[arg(long, env = "CHECKERS_DISCOVERY_PORT")]
    discovery_port: Option<u16>,

    /// Disable the discovery responder.
    #[arg(long)]
    no_discovery: bool,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, mut config: LobbyConfig) -> LobbyConfig {
        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.network.lobby_port = port;
        }
        if let Some(port) = self.discovery_port {
            config.network.discovery_port = port;
        }
        if self.no_discovery {
            config.network.discovery_enabled = false;
        }
        config
    }

    fn load_config(&self) -> anyhow::Result<LobbyConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config_file_path().context("locating the config file")?,
        };
        let config = load_config_from(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        Ok(self.apply(config))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.lobby.log_level)),
        )
        .init();

    let lobby_addr = config.network.lobby_addr().context("invalid lobby address")?;
    info!("checkers lobby starting on {lobby_addr}");

    let running = Arc::new(AtomicBool::new(true));

    // ── Discovery responder ────────────────────────────────────────────────────
    if config.network.discovery_enabled {
        let identity = ProbeIdentity::new(
            config.identity.nickname.clone(),
            config.identity.profile_image.clone(),
        )
        .context("invalid [identity] in config")?;
        let responder_config = ProbeResponderConfig {
            bind: config
                .network
                .discovery_addr()
                .context("invalid discovery address")?,
            reply_to: None,
        };

        // A lobby without discovery still works; clients can use its address.
        if let Err(e) = start_probe_responder(
            responder_config,
            Arc::new(RwLock::new(identity)),
            Arc::clone(&running),
        ) {
            error!("failed to start discovery responder: {e}");
        }
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Lobby ─────────────────────────────────────────────────────────────────
    let lobby = Lobby::bind(lobby_addr, Box::new(ForwardingRelay::new()))
        .await
        .context("starting the lobby")?;
    lobby.run(running).await;

    info!("checkers lobby stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
