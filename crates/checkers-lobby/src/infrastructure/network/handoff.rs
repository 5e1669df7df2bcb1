//! Handoff of two lobby connections into a match session.
//!
//! When an invitation is accepted the multiplexer takes both connections out
//! of its registration set, converts them into blocking
//! [`std::net::TcpStream`]s with [`into_blocking`], and passes a [`Session`]
//! to the configured [`SessionRelay`].  From then on the lobby never reads
//! from or writes to those sockets again.  Replies the lobby queued but could
//! not write yet travel with the participant in
//! [`SessionParticipant::unsent`]; the relay sends them first.
//!
//! The only way back into lobby state is [`SessionCleanup::release`], which
//! asks the lobby task to forget both players once the session is over.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::application::ConnId;

use super::multiplexer::LobbyCommand;

/// Error raised while moving a connection out of the lobby.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The stream could not be detached from the async runtime or switched to
    /// blocking mode.
    #[error("failed to switch {conn} to blocking mode: {source}")]
    Blocking {
        conn: ConnId,
        #[source]
        source: std::io::Error,
    },
}

/// Detaches a tokio stream from the runtime and makes it blocking.
///
/// # Errors
///
/// Returns [`HandoffError::Blocking`] if either step fails; the stream is
/// dropped (and thereby closed) in that case.
pub fn into_blocking(
    conn: ConnId,
    stream: tokio::net::TcpStream,
) -> Result<TcpStream, HandoffError> {
    let blocking = |source| HandoffError::Blocking { conn, source };
    let std_stream = stream.into_std().map_err(blocking)?;
    std_stream.set_nonblocking(false).map_err(blocking)?;
    Ok(std_stream)
}

/// One side of a match session.
#[derive(Debug)]
pub struct SessionParticipant {
    pub conn: ConnId,
    pub peer: Option<SocketAddr>,
    pub stream: TcpStream,
    /// Lobby replies the socket had not taken yet at handoff (usually empty).
    pub unsent: Vec<u8>,
}

impl SessionParticipant {
    pub fn new(conn: ConnId, stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            conn,
            peer,
            stream,
            unsent: Vec::new(),
        }
    }

    pub fn with_unsent(mut self, unsent: Vec<u8>) -> Self {
        self.unsent = unsent;
        self
    }

    /// Writes the leftover lobby replies, blocking until they are sent.
    pub fn deliver_unsent(&mut self) -> std::io::Result<()> {
        if self.unsent.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.unsent)?;
        self.unsent.clear();
        Ok(())
    }
}

/// Capability to clean the lobby directory up after a session ends.
///
/// Releasing happens at most once: either explicitly through
/// [`release`](Self::release) or when the value is dropped, so a relay that
/// discards a session without running it still frees both players.
#[derive(Debug)]
pub struct SessionCleanup {
    asker: ConnId,
    accepter: ConnId,
    commands: Option<mpsc::UnboundedSender<LobbyCommand>>,
}

impl SessionCleanup {
    pub(crate) fn new(
        asker: ConnId,
        accepter: ConnId,
        commands: mpsc::UnboundedSender<LobbyCommand>,
    ) -> Self {
        Self {
            asker,
            accepter,
            commands: Some(commands),
        }
    }

    /// Tells the lobby both participants are gone.
    pub fn release(mut self) {
        self.send_release();
    }

    fn send_release(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        let cmd = LobbyCommand::ReleaseSession {
            asker: self.asker,
            accepter: self.accepter,
        };
        if commands.send(cmd).is_err() {
            warn!(
                "lobby stopped before session {} / {} was released",
                self.asker, self.accepter
            );
        }
    }
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.send_release();
    }
}

/// Everything a relay needs to run one match.
#[derive(Debug)]
pub struct Session {
    pub asker: SessionParticipant,
    pub accepter: SessionParticipant,
    pub cleanup: SessionCleanup,
}

/// Starts a match session on its own schedule.
///
/// Implementations must return promptly; the lobby task calls this inline.
#[cfg_attr(test, mockall::automock)]
pub trait SessionRelay: Send + Sync {
    fn start_session(&self, session: Session);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
