//! Checkers client entry point.
//!
//! Connects to a lobby (given directly or found with a LAN probe), registers,
//! and prints what happens until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! checkers-client --nickname <NAME> [OPTIONS]
//!
//! Options:
//!   --server <ADDR>          Lobby address, e.g. 192.168.1.10:10001
//!   --discover               Probe the LAN for a lobby instead
//!   --lobby-port <PORT>      Lobby TCP port for discovered lobbies [default: 10001]
//!   --discovery-port <PORT>  UDP discovery port [default: 10000]
//!   --image <BASE64>         Profile image, already base64 [default: aW1n]
//!   --invite <CODE>          Invite the player with this code once registered
//!   --auto-accept            Accept every invitation received
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use checkers_client::infrastructure::discovery::probe_lan;
use checkers_client::infrastructure::network::{AgentConfig, ProtocolAgent};
use checkers_core::domain::base64::{base64_encode, is_base64};
use checkers_core::protocol::discovery::DEFAULT_DISCOVERY_PORT;
use checkers_core::{InviteCode, PlayerIdentity};

const DEFAULT_LOBBY_PORT: u16 = 10001;
const PROBE_WINDOW: Duration = Duration::from_secs(2);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN checkers client.
#[derive(Debug, Parser)]
#[command(
    name = "checkers-client",
    about = "Connects to a LAN checkers lobby and looks for an opponent",
    version
)]
struct Cli {
    /// Lobby address.
    #[arg(long, conflicts_with = "discover")]
    server: Option<SocketAddr>,

    /// Find a lobby with a UDP probe.
    #[arg(long)]
    discover: bool,

    /// TCP port of a discovered lobby.
    #[arg(long, default_value_t = DEFAULT_LOBBY_PORT)]
    lobby_port: u16,

    /// UDP port lobbies answer probes on.
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// Display name shown to other players.
    #[arg(long, env = "CHECKERS_NICKNAME")]
    nickname: String,

    /// Profile image, base64-encoded.
    #[arg(long, default_value = "aW1n")]
    image: String,

    /// Invite the player owning this code after registering.
    #[arg(long)]
    invite: Option<String>,

    /// Accept every invitation.
    #[arg(long)]
    auto_accept: bool,
}

impl Cli {
    /// Builds the wire identity from the display name and image.
    fn identity(&self) -> anyhow::Result<PlayerIdentity> {
        if self.nickname.trim().is_empty() {
            bail!("nickname must not be empty");
        }
        if self.image.is_empty() || !is_base64(&self.image) {
            bail!("image must be non-empty base64");
        }
        Ok(PlayerIdentity::new(
            base64_encode(self.nickname.trim().as_bytes()),
            self.image.clone(),
        ))
    }

    fn invite_code(&self) -> anyhow::Result<Option<InviteCode>> {
        self.invite
            .as_deref()
            .map(InviteCode::parse)
            .transpose()
            .context("invalid --invite code")
    }

    async fn resolve_server(&self) -> anyhow::Result<SocketAddr> {
        if let Some(server) = self.server {
            return Ok(server);
        }
        if !self.discover {
            bail!("pass --server <ADDR> or --discover");
        }
        let peers = probe_lan(self.discovery_port, PROBE_WINDOW)
            .await
            .context("probing the LAN")?;
        let Some(first) = peers.first() else {
            bail!("no lobby answered on UDP port {}", self.discovery_port);
        };
        Ok(SocketAddr::new(first.addr.ip(), self.lobby_port))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let identity = cli.identity()?;
    let invite = cli.invite_code()?;
    let server = cli.resolve_server().await?;

    let running = Arc::new(AtomicBool::new(true));
    let (agent, receive_loop) =
        ProtocolAgent::connect(AgentConfig::new(server, identity), Arc::clone(&running))
            .await
            .context("connecting to the lobby")?;

    let code = agent.invite_code().await.context("registering")?;
    println!("your invite code: {code}");

    let players = agent.get_active_players().await?.wait().await?;
    println!("{} player(s) online:", players.len());
    for player in &players {
        let name = player
            .display_name()
            .unwrap_or_else(|_| player.nickname.clone());
        println!("  {name}");
    }

    // ── Inbound ───────────────────────────────────────────────────────────────
    let proposals = agent.clone();
    let auto_accept = cli.auto_accept;
    tokio::spawn(async move {
        while let Some(proposal) = proposals.proposals().next().await {
            info!(
                "invitation from {} (code {})",
                proposal.from_nickname, proposal.code
            );
            if auto_accept {
                if let Err(e) = proposals.accept_invitation(&proposal.code).await {
                    error!("failed to accept invitation: {e}");
                }
            }
        }
    });

    let chats = agent.clone();
    tokio::spawn(async move {
        while let Some(text) = chats.chats().next().await {
            println!("opponent: {text}");
        }
    });

    let moves = agent.clone();
    tokio::spawn(async move {
        while let Some(mv) = moves.moves().next().await {
            println!("opponent moved {mv}");
        }
    });

    // ── Outbound invitation ───────────────────────────────────────────────────
    if let Some(target) = invite {
        let reply = agent.invite(&target).await?;
        tokio::spawn(async move {
            match reply.wait().await {
                Ok(true) => info!("{target} accepted, match starting"),
                Ok(false) => warn!("{target} declined or is unknown"),
                Err(e) => error!("invitation to {target} failed: {e}"),
            }
        });
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
            info!("received Ctrl+C, shutting down");
        }
        _ = wait_for_disconnect(&receive_loop) => {}
    }
    running.store(false, Ordering::Relaxed);
    if let Err(e) = receive_loop.await {
        error!("receive loop failed: {e}");
    }

    Ok(())
}

async fn wait_for_disconnect(handle: &tokio::task::JoinHandle<()>) {
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_encodes_display_name() {
        // Arrange
        let cli = Cli::parse_from([
            "checkers-client",
            "--nickname",
            "alice",
            "--server",
            "127.0.0.1:1",
        ]);

        // Act
        let identity = cli.identity().unwrap();

        // Assert
        assert_eq!(identity, PlayerIdentity::new("YWxpY2U=", "aW1n"));
    }

    #[test]
    fn test_identity_rejects_bad_image() {
        let cli = Cli::parse_from(["checkers-client", "--nickname", "a", "--image", "no*pe"]);
        assert!(cli.identity().is_err());
    }

    #[test]
    fn test_invite_code_is_validated() {
        let ok = Cli::parse_from([
            "checkers-client",
            "--nickname",
            "a",
            "--invite",
            "abc123def456",
        ]);
        let bad = Cli::parse_from(["checkers-client", "--nickname", "a", "--invite", "short"]);

        assert!(ok.invite_code().unwrap().is_some());
        assert!(bad.invite_code().is_err());
    }

    #[test]
    fn test_server_and_discover_conflict() {
        let result = Cli::try_parse_from([
            "checkers-client",
            "--nickname",
            "a",
            "--server",
            "127.0.0.1:1",
            "--discover",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_server_is_required_without_discovery() {
        let cli = Cli::parse_from(["checkers-client", "--nickname", "a"]);
        assert!(cli.resolve_server().await.is_err());
    }

    #[tokio::test]
    async fn test_explicit_server_is_used() {
        let cli = Cli::parse_from([
            "checkers-client",
            "--nickname",
            "a",
            "--server",
            "10.0.0.5:10001",
        ]);
        assert_eq!(
            cli.resolve_server().await.unwrap(),
            "10.0.0.5:10001".parse::<SocketAddr>().unwrap()
        );
    }
}
