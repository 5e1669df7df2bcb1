//! Datagrams of the LAN discovery exchange.
//!
//! A client sends [`PROBE`] to the discovery port; every lobby that hears it
//! answers with `checkers:probeResp <nick> <img>`, both fields in base64.
//! Datagrams are single messages: no `!` delimiter is used.
//!
//! Answers go to the discovery port itself, so a lobby and a probing client
//! on the same host both listen there.  [`bind_shared`] is how either side
//! opens that socket.

use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::domain::base64::is_base64;
use crate::domain::player::PlayerIdentity;

use super::codec::PREFIX;

/// UDP port lobbies listen on for probes.
pub const DEFAULT_DISCOVERY_PORT: u16 = 10000;

/// The exact datagram that asks lobbies to identify themselves.
pub const PROBE: &str = "checkers:probe";

/// Verb of a lobby's answer.
pub const PROBE_RESPONSE_VERB: &str = "probeResp";

/// Renders the answer a lobby sends for the given wire-form identity fields.
pub fn probe_response(nickname: &str, profile_image: &str) -> String {
    format!("{PREFIX}{PROBE_RESPONSE_VERB} {nickname} {profile_image}")
}

/// Binds a blocking UDP socket with `SO_REUSEADDR` set.
///
/// A port is shared only between sockets that all set the option, so both
/// the responder and the probe bind through here.  Broadcast datagrams reach
/// every socket on the port.
///
/// # Errors
///
/// Any I/O error raised while setting up the socket.
pub fn bind_shared(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Parses a probe response datagram.
///
/// The datagram must be exactly `checkers:probeResp <nick> <img>` with both
/// fields in base64; anything else yields `None`.
pub fn parse_probe_response(datagram: &str) -> Option<PlayerIdentity> {
    let mut tokens = datagram.split_whitespace();
    let verb = tokens.next()?.strip_prefix(PREFIX)?;
    if verb != PROBE_RESPONSE_VERB {
        return None;
    }
    let nickname = tokens.next()?;
    let image = tokens.next()?;
    if tokens.next().is_some() || !is_base64(nickname) || !is_base64(image) {
        return None;
    }
    Some(PlayerIdentity::new(nickname, image))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
