//! Matchmaker: the lobby's per-message protocol state machine.
//!
//! The matchmaker receives one decoded message at a time together with the
//! connection it arrived on, updates the [`Directory`], and returns the
//! [`LobbyAction`]s the multiplexer must carry out.  It never touches a socket.
//!
//! # Invitation flow
//!
//! ```text
//! Bob (asker)                      Lobby                       Alice (target)
//! ───────────                      ─────                       ──────────────
//! inviteAsk <aliceCode>   ──►  look up aliceCode
//!                              ──► inviteAsk <bobNick> <bobImg> <bobCode>  ──►
//!                                                          ◄── inviteOk <bobCode>
//!                 ◄── inviteOk <bobCode>
//!                              Handoff { asker: Bob, accepter: Alice }
//! ```
//!
//! There is no stored "pending invite": the exchange is correlated purely by
//! the codes on the wire, and an `inviteOk` for any live code starts a match.

use std::collections::HashSet;

use checkers_core::domain::base64::is_base64;
use checkers_core::protocol::messages::USER_ALREADY_PRESENT;
use checkers_core::{parse_message, ClientBound, InviteCode, PlayerIdentity, ServerBound};
use tracing::{debug, error, info, warn};

use super::directory::{ConnId, Directory, DirectoryError};

/// Something the multiplexer has to do as a result of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyAction {
    /// Write `message` to connection `to`.
    Send { to: ConnId, message: ClientBound },
    /// Take both connections out of the lobby and start a match session.
    Handoff { asker: ConnId, accepter: ConnId },
}

impl LobbyAction {
    fn send(to: ConnId, message: ClientBound) -> Self {
        Self::Send { to, message }
    }
}

/// Lobby matchmaking state: the directory plus the set of connections that
/// have been promised to a match session.
#[derive(Debug, Default)]
pub struct Matchmaker {
    directory: Directory,
    in_session: HashSet<ConnId>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the directory.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Whether `conn` has been handed to a session and not yet released.
    pub fn is_in_session(&self, conn: ConnId) -> bool {
        self.in_session.contains(&conn)
    }

    /// Number of connections currently owned by match sessions.
    pub fn session_count(&self) -> usize {
        self.in_session.len()
    }

    /// Handles one message string received on `conn`.
    ///
    /// Malformed messages are logged and produce no actions; the connection is
    /// never punished for them.
    pub fn handle_message(&mut self, conn: ConnId, message: &str) -> Vec<LobbyAction> {
        let parsed = parse_message(message).and_then(|raw| ServerBound::parse(&raw));
        match parsed {
            Ok(msg) => self.handle(conn, msg),
            Err(e) => {
                warn!("{conn}: dropping message <{message}>: {e}");
                Vec::new()
            }
        }
    }

    /// Handles one typed message received on `conn`.
    pub fn handle(&mut self, conn: ConnId, msg: ServerBound) -> Vec<LobbyAction> {
        let mut actions = Vec::new();
        match msg {
            ServerBound::Config { nickname, image } => {
                self.on_config(conn, nickname, image, &mut actions)
            }
            ServerBound::GetPlayers => {
                let players = self.directory.players().cloned().collect();
                actions.push(LobbyAction::send(conn, ClientBound::OnlinePlayers(players)));
            }
            ServerBound::InviteAsk { code } => self.on_invite_ask(conn, &code, &mut actions),
            ServerBound::InviteRejected { code } => {
                self.on_invite_rejected(conn, &code, &mut actions)
            }
            ServerBound::InviteOk { code } => self.on_invite_ok(conn, code, &mut actions),
            ServerBound::Chat(_) | ServerBound::Move(_) => {
                warn!("{conn}: chat/move outside a session, ignoring");
            }
        }
        actions
    }

    /// Removes every directory entry of a connection that closed.
    pub fn connection_closed(&mut self, conn: ConnId) -> Option<PlayerIdentity> {
        self.in_session.remove(&conn);
        let removed = self.directory.remove_connection(conn);
        if let Some(player) = &removed {
            info!("{conn}: player {} left the lobby", player.nickname);
        }
        removed
    }

    /// Cleans up after a finished (or failed) match session.
    pub fn release_session(&mut self, asker: ConnId, accepter: ConnId) {
        for conn in [asker, accepter] {
            self.connection_closed(conn);
        }
    }

    /// Returns `conn` to ordinary lobby duty after a handoff that never started.
    pub fn leave_session(&mut self, conn: ConnId) {
        self.in_session.remove(&conn);
    }

    // ── Verb handlers ─────────────────────────────────────────────────────────

    fn on_config(
        &mut self,
        conn: ConnId,
        nickname: String,
        image: String,
        actions: &mut Vec<LobbyAction>,
    ) {
        if self.directory.nickname_of(conn).is_some() {
            // Notice only; the new registration below still goes ahead.
            actions.push(LobbyAction::send(conn, ClientBound::ConfUserTaken));
        }

        if !is_base64(&nickname) {
            actions.push(LobbyAction::send(conn, ClientBound::ConfBadNick));
            return;
        }
        if !is_base64(&image) {
            actions.push(LobbyAction::send(conn, ClientBound::ConfBadImg));
            return;
        }

        match self
            .directory
            .register_identity(conn, PlayerIdentity::new(nickname, image))
        {
            Ok(()) => {}
            Err(DirectoryError::NicknameTaken { nickname, owner }) => {
                warn!("{conn}: nickname {nickname} already present on {owner}");
                actions.push(LobbyAction::send(
                    conn,
                    ClientBound::Error(USER_ALREADY_PRESENT.to_string()),
                ));
                return;
            }
        }

        let code = self.directory.issue_code(conn);
        info!(
            "{conn}: registered {} with invite code {code}",
            self.directory.nickname_of(conn).unwrap_or_default()
        );
        actions.push(LobbyAction::send(conn, ClientBound::ConfOk { code }));
    }

    /// Resolves the live, lobby-owned connection behind `code`, other than `conn`.
    fn invitable_target(&self, conn: ConnId, code: &InviteCode) -> Option<ConnId> {
        let target = self.directory.owner_of_code(code)?;
        if target == conn {
            debug!("{conn}: refers to its own invite code");
            return None;
        }
        if self.in_session.contains(&target) {
            debug!("{conn}: invite code {code} belongs to a player in a match");
            return None;
        }
        Some(target)
    }

    fn on_invite_ask(&mut self, conn: ConnId, code: &InviteCode, actions: &mut Vec<LobbyAction>) {
        let Some(target) = self.invitable_target(conn, code) else {
            warn!("{conn}: invite code {code} not found");
            actions.push(LobbyAction::send(conn, ClientBound::InviteErr));
            return;
        };

        let (Some(asker), Some(asker_code)) =
            (self.directory.identity_of(conn), self.directory.code_of(conn))
        else {
            error!("{conn}: asking connection has no registered identity, dropping inviteAsk");
            return;
        };

        debug!("{conn}: forwarding invite to {target}");
        actions.push(LobbyAction::send(
            target,
            ClientBound::InviteAsk {
                nickname: asker.nickname.clone(),
                image: asker.profile_image.clone(),
                code: asker_code.clone(),
            },
        ));
    }

    fn on_invite_rejected(
        &mut self,
        conn: ConnId,
        code: &InviteCode,
        actions: &mut Vec<LobbyAction>,
    ) {
        match self.invitable_target(conn, code) {
            Some(asker) => actions.push(LobbyAction::send(asker, ClientBound::InviteRejected)),
            None => warn!("{conn}: rejected an invite from unknown code {code}"),
        }
    }

    fn on_invite_ok(&mut self, conn: ConnId, code: InviteCode, actions: &mut Vec<LobbyAction>) {
        let Some(asker) = self.invitable_target(conn, &code) else {
            warn!("{conn}: accepted an invite from unknown code {code}");
            actions.push(LobbyAction::send(conn, ClientBound::InviteErr));
            return;
        };

        info!("{conn}: accepted invite from {asker}, starting a session");
        self.in_session.insert(asker);
        self.in_session.insert(conn);
        actions.push(LobbyAction::send(asker, ClientBound::InviteOk { code }));
        actions.push(LobbyAction::Handoff {
            asker,
            accepter: conn,
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
