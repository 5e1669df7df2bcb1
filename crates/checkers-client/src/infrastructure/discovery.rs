//! LAN lobby discovery, client side.
//!
//! A [`LanProbe`] sends one `checkers:probe` datagram and collects every
//! `checkers:probeResp <nick> <img>` that arrives within a listening window.
//!
//! Lobbies broadcast their answer to the discovery port rather than to the
//! prober's own address, so a probe meant for the real LAN binds that port
//! itself (see [`probe_lan`]).  The probe's own broadcast comes back to it
//! and is ignored like any other datagram that is not a response.
//!
//! The datagram format lives in [`checkers_core::protocol::discovery`].

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use checkers_core::protocol::discovery::{bind_shared, parse_probe_response, PROBE};
use checkers_core::PlayerIdentity;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

const MAX_DATAGRAM: usize = 512;

/// Errors raised while probing.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to bind probe socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("probe socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A lobby that answered a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Source address of the answer.
    pub addr: SocketAddr,
    /// Identity the lobby advertises.
    pub identity: PlayerIdentity,
}

/// A UDP socket that can look for lobbies.
#[derive(Debug)]
pub struct LanProbe {
    socket: UdpSocket,
}

impl LanProbe {
    /// Binds the probe socket with broadcast and address reuse enabled.
    ///
    /// The port can be shared with a lobby responder running on the same
    /// host.
    ///
    /// # Errors
    ///
    /// [`ProbeError::BindFailed`] if `bind` is unavailable.
    pub async fn bind(bind: SocketAddr) -> Result<Self, ProbeError> {
        let std_socket =
            bind_shared(bind).map_err(|source| ProbeError::BindFailed { addr: bind, source })?;
        std_socket.set_broadcast(true)?;
        std_socket.set_nonblocking(true)?;
        Ok(Self {
            socket: UdpSocket::from_std(std_socket)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProbeError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one probe to `target` and listens for `listen_for`.
    ///
    /// Answers are returned in arrival order, one per source address.
    pub async fn probe(
        &self,
        target: SocketAddr,
        listen_for: Duration,
    ) -> Result<Vec<DiscoveredPeer>, ProbeError> {
        self.socket.send_to(PROBE.as_bytes(), target).await?;
        debug!("probe sent to {target}");

        let deadline = Instant::now() + listen_for;
        let mut peers: Vec<DiscoveredPeer> = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];

        while let Ok(received) = timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
            let (n, from) = received?;
            let text = String::from_utf8_lossy(&buf[..n]);
            let Some(identity) = parse_probe_response(&text) else {
                debug!("ignoring datagram from {from}");
                continue;
            };
            if peers.iter().any(|p| p.addr == from) {
                continue;
            }
            info!("lobby found at {from}");
            peers.push(DiscoveredPeer {
                addr: from,
                identity,
            });
        }

        Ok(peers)
    }
}

/// Broadcasts a probe on the LAN and collects the lobbies that answer.
///
/// Binds `0.0.0.0:<port>`, because that is where lobbies send their answers.
/// A lobby on this host keeps receiving probes: both sockets share the port.
pub async fn probe_lan(port: u16, listen_for: Duration) -> Result<Vec<DiscoveredPeer>, ProbeError> {
    let probe = LanProbe::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
    probe
        .probe(SocketAddr::from((Ipv4Addr::BROADCAST, port)), listen_for)
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
