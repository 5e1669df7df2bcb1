//! Default match session: forwards `chat` and `move` between the two players.
//!
//! Each session runs on two named OS threads, one per direction.  Lobby
//! replies still queued at handoff are written first.  Then a pump
//! blocking-reads up to 1024 bytes, decodes the chunk, and writes every `chat`
//! and `move` message to the other participant unchanged.  Anything else is
//! logged and dropped.  When either player disconnects both sockets are shut
//! down, the other pump ends too, and the lobby is told to forget both players.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use checkers_core::protocol::codec::{decode_bytes, SERVER_READ_LIMIT};
use checkers_core::{parse_message, ClientBound, ServerBound};
use tracing::{debug, info, warn};

use crate::application::ConnId;

use super::handoff::{Session, SessionRelay};

/// Relay that forwards in-game messages with one thread per direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingRelay;

impl ForwardingRelay {
    pub fn new() -> Self {
        Self
    }
}

impl SessionRelay for ForwardingRelay {
    fn start_session(&self, session: Session) {
        let name = format!(
            "checkers-session-{}-{}",
            session.asker.conn.0, session.accepter.conn.0
        );
        if let Err(e) = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_session(session))
        {
            // The dropped session closes both sockets and releases the players.
            warn!("failed to spawn session thread: {e}");
        }
    }
}

fn run_session(session: Session) {
    let Session {
        mut asker,
        mut accepter,
        cleanup,
    } = session;
    info!("session started: {} vs {}", asker.conn, accepter.conn);

    for participant in [&mut asker, &mut accepter] {
        if let Err(e) = participant.deliver_unsent() {
            warn!("{}: failed to deliver queued lobby replies: {e}", participant.conn);
        }
    }

    let clones = asker
        .stream
        .try_clone()
        .and_then(|a| accepter.stream.try_clone().map(|b| (a, b)));

    match clones {
        Ok((asker_out, accepter_in)) => {
            let (a_conn, b_conn) = (asker.conn, accepter.conn);
            let back = std::thread::Builder::new()
                .name(format!("checkers-relay-{}", b_conn.0))
                .spawn(move || pump(b_conn, accepter_in, asker_out));

            pump(a_conn, asker.stream, accepter.stream);
            match back {
                Ok(handle) => {
                    if handle.join().is_err() {
                        warn!("relay thread for {b_conn} panicked");
                    }
                }
                Err(e) => warn!("failed to spawn relay thread for {b_conn}: {e}"),
            }
        }
        Err(e) => warn!("failed to clone session sockets: {e}"),
    }

    info!("session ended: {} vs {}", asker.conn, accepter.conn);
    cleanup.release();
}

/// Copies in-game messages from `from` to `to` until either side closes, then
/// shuts both sockets down.
fn pump(source: ConnId, mut from: TcpStream, mut to: TcpStream) {
    let mut buf = [0u8; SERVER_READ_LIMIT];
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => {
                debug!("{source}: closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("{source}: read failed: {e}");
                break;
            }
        };

        if !forward_chunk(source, &buf[..n], &mut to) {
            break;
        }
    }

    let _ = from.shutdown(Shutdown::Both);
    let _ = to.shutdown(Shutdown::Both);
}

/// Forwards the relayable messages of one chunk.  Returns `false` when the
/// destination can no longer be written.
fn forward_chunk(source: ConnId, chunk: &[u8], to: &mut impl Write) -> bool {
    for message in decode_bytes(chunk) {
        let relayed = match parse_message(&message).and_then(|raw| ServerBound::parse(&raw)) {
            Ok(ServerBound::Chat(text)) => ClientBound::Chat(text),
            Ok(ServerBound::Move(payload)) => ClientBound::Move(payload),
            Ok(other) => {
                warn!("{source}: ignoring {other:?} during a session");
                continue;
            }
            Err(e) => {
                warn!("{source}: dropping message <{message}>: {e}");
                continue;
            }
        };
        if let Err(e) = to.write_all(relayed.encode().as_bytes()) {
            debug!("{source}: peer write failed: {e}");
            return false;
        }
    }
    true
}

// ── Tests ─────────────────────────────────────────────────────────────────────
