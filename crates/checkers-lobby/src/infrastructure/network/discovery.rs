//! UDP broadcast discovery responder.
//!
//! The lobby binds a UDP socket on the discovery port (default 10000) and
//! answers every `checkers:probe` datagram with
//! `checkers:probeResp <nick> <img>`, where both fields are this lobby's
//! advertised identity in base64.
//!
//! The reply is *broadcast* back to `255.255.255.255:<discovery port>`
//! rather than sent to the prober's source address, so every listening client
//! on the LAN learns about the lobby from a single probe.  The destination is
//! configurable so tests can use loopback.
//!
//! The responder runs on a dedicated OS thread with blocking socket I/O.
//! The socket is bound with address reuse, so a client probing from the
//! same host can listen on the discovery port too.
//!
//! # Read timeout
//!
//! The socket has a 500 ms read timeout.  On each timeout the `running` flag
//! is checked; clearing it stops the thread within one timeout period.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};
use std::thread::JoinHandle;
use std::time::Duration;

use checkers_core::domain::base64::base64_decode;
use checkers_core::protocol::discovery::{
    bind_shared, probe_response, DEFAULT_DISCOVERY_PORT, PROBE,
};
use checkers_core::DomainError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Largest probe datagram that is read.
const MAX_DATAGRAM: usize = 100;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for discovery service operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The socket could not be configured after binding.
    #[error("failed to configure discovery socket: {0}")]
    Socket(#[source] std::io::Error),

    /// The responder thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The advertised identity is not acceptable.
    #[error("invalid probe identity: {0}")]
    InvalidIdentity(#[from] DomainError),
}

/// The identity a lobby advertises in probe responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeIdentity {
    nickname: String,
    profile_image: String,
}

impl ProbeIdentity {
    /// Builds an identity from wire-form (base64) fields.
    ///
    /// # Errors
    ///
    /// [`DomainError::EmptyNickname`] for an empty nickname and
    /// [`DomainError::InvalidBase64`] if the image does not decode.
    pub fn new(
        nickname: impl Into<String>,
        profile_image: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let nickname = nickname.into();
        let profile_image = profile_image.into();
        if nickname.is_empty() {
            return Err(DomainError::EmptyNickname);
        }
        check_image(&profile_image)?;
        Ok(Self {
            nickname,
            profile_image,
        })
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn profile_image(&self) -> &str {
        &self.profile_image
    }

    pub fn set_nickname(&mut self, nickname: impl Into<String>) -> Result<(), DomainError> {
        let nickname = nickname.into();
        if nickname.is_empty() {
            return Err(DomainError::EmptyNickname);
        }
        self.nickname = nickname;
        Ok(())
    }

    /// Replaces the image.  Also fails if the current nickname is empty.
    pub fn set_profile_image(
        &mut self,
        profile_image: impl Into<String>,
    ) -> Result<(), DomainError> {
        let profile_image = profile_image.into();
        check_image(&profile_image)?;
        if self.nickname.is_empty() {
            return Err(DomainError::EmptyNickname);
        }
        self.profile_image = profile_image;
        Ok(())
    }

    /// The `checkers:probeResp <nick> <img>` datagram for this identity.
    pub fn response(&self) -> String {
        probe_response(&self.nickname, &self.profile_image)
    }
}

fn check_image(image: &str) -> Result<(), DomainError> {
    base64_decode(image)
        .map(|_| ())
        .map_err(|_| DomainError::InvalidBase64 {
            field: "profile image",
        })
}

/// Identity shared between the responder thread and whoever may update it.
pub type SharedProbeIdentity = Arc<RwLock<ProbeIdentity>>;

/// Where the responder listens and where it sends its answers.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResponderConfig {
    /// Address to bind, normally `0.0.0.0:10000`.
    pub bind: SocketAddr,
    /// Destination of responses.  `None` means the LAN broadcast address on
    /// the bound port.
    pub reply_to: Option<SocketAddr>,
}

impl ProbeResponderConfig {
    /// Listens on every interface at `port` and broadcasts responses.
    pub fn broadcast(port: u16) -> Self {
        Self {
            bind: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port),
            reply_to: None,
        }
    }
}

impl Default for ProbeResponderConfig {
    fn default() -> Self {
        Self::broadcast(DEFAULT_DISCOVERY_PORT)
    }
}

/// A running responder.
#[derive(Debug)]
pub struct ProbeResponder {
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// Returns the response to send for `datagram`, or `None` if it is not a probe.
pub fn prepare_response(datagram: &[u8], identity: &ProbeIdentity) -> Option<String> {
    (datagram == PROBE.as_bytes()).then(|| identity.response())
}

/// Binds the discovery socket and spawns the responder thread.
///
/// # Errors
///
/// [`DiscoveryError::BindFailed`] if the socket cannot be bound, or
/// [`DiscoveryError::Socket`] / [`DiscoveryError::Spawn`] if it cannot be
/// configured or the thread cannot start.
pub fn start_probe_responder(
    config: ProbeResponderConfig,
    identity: SharedProbeIdentity,
    running: Arc<AtomicBool>,
) -> Result<ProbeResponder, DiscoveryError> {
    let socket = bind_shared(config.bind).map_err(|source| DiscoveryError::BindFailed {
        addr: config.bind,
        source,
    })?;
    socket.set_broadcast(true).map_err(DiscoveryError::Socket)?;
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(DiscoveryError::Socket)?;
    let local_addr = socket.local_addr().map_err(DiscoveryError::Socket)?;

    let reply_to = config
        .reply_to
        .unwrap_or_else(|| SocketAddr::new(Ipv4Addr::BROADCAST.into(), local_addr.port()));

    let handle = std::thread::Builder::new()
        .name("checkers-discovery".to_string())
        .spawn(move || responder_loop(socket, reply_to, identity, running))
        .map_err(DiscoveryError::Spawn)?;

    info!("discovery responder listening on UDP {local_addr}, answering to {reply_to}");
    Ok(ProbeResponder { local_addr, handle })
}

fn responder_loop(
    socket: UdpSocket,
    reply_to: SocketAddr,
    identity: SharedProbeIdentity,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        let response = {
            let guard = match identity.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            prepare_response(&buf[..len], &guard)
        };

        match response {
            Some(response) => {
                debug!("probe from {src}");
                if let Err(e) = socket.send_to(response.as_bytes(), reply_to) {
                    warn!("failed to send probe response to {reply_to}: {e}");
                }
            }
            None => debug!("ignoring {len}-byte datagram from {src}"),
        }
    }

    info!("discovery responder stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ProbeIdentity {
        ProbeIdentity::new("bmljaw==", "aW1n").unwrap()
    }

    #[test]
    fn test_probe_identity_rejects_empty_nickname() {
        assert_eq!(ProbeIdentity::new("", "aW1n"), Err(DomainError::EmptyNickname));
    }

    #[test]
    fn test_probe_identity_rejects_non_base64_image() {
        assert!(matches!(
            ProbeIdentity::new("bmljaw==", "not base64!"),
            Err(DomainError::InvalidBase64 { .. })
        ));
        // Lenient alphabet is not enough here: a length of 5 cannot decode.
        assert!(ProbeIdentity::new("bmljaw==", "aW1nZ").is_err());
    }

    #[test]
    fn test_set_nickname_rejects_empty_and_keeps_old_value() {
        let mut id = identity();
        assert_eq!(id.set_nickname(""), Err(DomainError::EmptyNickname));
        assert_eq!(id.nickname(), "bmljaw==");

        id.set_nickname("Ym9i").unwrap();
        assert_eq!(id.nickname(), "Ym9i");
    }

    #[test]
    fn test_set_profile_image_validates_base64() {
        let mut id = identity();
        assert!(id.set_profile_image("%%%").is_err());
        assert_eq!(id.profile_image(), "aW1n");

        id.set_profile_image("aW1hZ2U=").unwrap();
        assert_eq!(id.profile_image(), "aW1hZ2U=");
    }

    #[test]
    fn test_prepare_response_answers_exact_probe_only() {
        // Arrange
        let id = identity();

        // Act / Assert
        assert_eq!(
            prepare_response(b"checkers:probe", &id).as_deref(),
            Some("checkers:probeResp bmljaw== aW1n")
        );
        assert!(prepare_response(b"checkers:probe!", &id).is_none());
        assert!(prepare_response(b"checkers:probeX", &id).is_none());
        assert!(prepare_response(b" checkers:probe", &id).is_none());
        assert!(prepare_response(b"", &id).is_none());
    }

    #[test]
    fn test_is_timeout_error_recognises_timeouts_only() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let would_block = std::io::Error::new(std::io::ErrorKind::WouldBlock, "would block");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");

        assert!(is_timeout_error(&timed_out));
        assert!(is_timeout_error(&would_block));
        assert!(!is_timeout_error(&refused));
    }

    #[test]
    fn test_default_config_broadcasts_on_port_10000() {
        let cfg = ProbeResponderConfig::default();
        assert_eq!(cfg.bind.port(), 10000);
        assert!(cfg.reply_to.is_none());
    }

    #[test]
    fn test_responder_answers_probe_over_loopback() {
        // Arrange: a "client" socket receives the responses.
        let client = UdpSocket::bind("127.0.0.1:0").expect("client bind");
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let responder = start_probe_responder(
            ProbeResponderConfig {
                bind: "127.0.0.1:0".parse().unwrap(),
                reply_to: Some(client.local_addr().unwrap()),
            },
            Arc::new(RwLock::new(identity())),
            Arc::clone(&running),
        )
        .expect("responder must bind");

        // Act
        client.send_to(b"checkers:probe", responder.local_addr).unwrap();
        let mut buf = [0u8; 128];
        let (len, _) = client.recv_from(&mut buf).expect("probe response");

        // Assert
        assert_eq!(&buf[..len], b"checkers:probeResp bmljaw== aW1n");

        running.store(false, Ordering::Relaxed);
        responder.handle.join().unwrap();
    }

    #[test]
    fn test_responder_ignores_other_datagrams() {
        // Arrange
        let client = UdpSocket::bind("127.0.0.1:0").expect("client bind");
        client
            .set_read_timeout(Some(Duration::from_millis(700)))
            .unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let responder = start_probe_responder(
            ProbeResponderConfig {
                bind: "127.0.0.1:0".parse().unwrap(),
                reply_to: Some(client.local_addr().unwrap()),
            },
            Arc::new(RwLock::new(identity())),
            Arc::clone(&running),
        )
        .expect("responder must bind");

        // Act
        client.send_to(b"checkers:hello", responder.local_addr).unwrap();
        let mut buf = [0u8; 128];
        let result = client.recv_from(&mut buf);

        // Assert
        assert!(result.is_err(), "non-probe datagrams get no response");

        running.store(false, Ordering::Relaxed);
        responder.handle.join().unwrap();
    }

    #[test]
    fn test_responder_uses_updated_identity() {
        // Arrange
        let client = UdpSocket::bind("127.0.0.1:0").expect("client bind");
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let shared = Arc::new(RwLock::new(identity()));
        let running = Arc::new(AtomicBool::new(true));
        let responder = start_probe_responder(
            ProbeResponderConfig {
                bind: "127.0.0.1:0".parse().unwrap(),
                reply_to: Some(client.local_addr().unwrap()),
            },
            Arc::clone(&shared),
            Arc::clone(&running),
        )
        .expect("responder must bind");

        // Act
        shared.write().unwrap().set_nickname("Ym9i").unwrap();
        client.send_to(b"checkers:probe", responder.local_addr).unwrap();
        let mut buf = [0u8; 128];
        let (len, _) = client.recv_from(&mut buf).expect("probe response");

        // Assert
        assert_eq!(&buf[..len], b"checkers:probeResp Ym9i aW1n");

        running.store(false, Ordering::Relaxed);
        responder.handle.join().unwrap();
    }

    #[test]
    fn test_responder_stops_when_flag_is_cleared() {
        let running = Arc::new(AtomicBool::new(false));
        let responder = start_probe_responder(
            ProbeResponderConfig {
                bind: "127.0.0.1:0".parse().unwrap(),
                reply_to: None,
            },
            Arc::new(RwLock::new(identity())),
            running,
        )
        .expect("responder must bind");

        responder.handle.join().expect("thread exits cleanly");
    }
}
