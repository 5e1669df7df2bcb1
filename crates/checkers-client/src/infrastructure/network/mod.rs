//! Client protocol agent: one player's connection to the lobby.
//!
//! Architecture:
//! - [`ProtocolAgent`] owns the write half of the TCP stream (behind a mutex,
//!   so any task may send) plus the result slots and inboxes.
//! - A spawned receive loop owns the read half, decodes every chunk, and
//!   routes each message to the matching slot or inbox.
//!
//! Outbound calls only write; they never wait for the answer.  Calls that
//! expect one return a [`Reply`] to be awaited separately.
//!
//! # Inbound routing
//!
//! | Message                          | Effect                                  |
//! |----------------------------------|-----------------------------------------|
//! | `Hello`                          | send `config <nick> <img>`              |
//! | `confOk <code>`                  | publish the invite code (first wins)    |
//! | `chat <text>`                    | queue on [`ProtocolAgent::chats`]       |
//! | `move <payload>`                 | parse, queue on [`ProtocolAgent::moves`]|
//! | `inviteAsk <nick> <img> <code>`  | queue on [`ProtocolAgent::proposals`]   |
//! | `inviteOk`                       | pending invite resolves `true`          |
//! | `inviteRejected` / `inviteErr`   | pending invite resolves `false`         |
//! | `onlinePlayers ...`              | pending player list resolves            |
//!
//! Malformed messages are logged and dropped; the connection stays up.  An
//! `onlinePlayers` with an odd token count is dropped entirely, so the pending
//! request stays unanswered.

pub mod pending;

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use checkers_core::protocol::codec::{decode_bytes, CLIENT_READ_LIMIT, DELIMITER};
use checkers_core::{ClientBound, InviteCode, Move, PlayerIdentity, ProtocolError, ServerBound};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use pending::{Inbox, PendingSlot, Reply};

/// How long one read may block before the stop flag is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors that can occur in the client agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// TCP connection to the lobby failed.
    #[error("failed to connect to lobby at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the established connection failed.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection ended before the answer arrived.
    #[error("connection closed")]
    Closed,

    /// A request of the same kind is still waiting for its answer.
    #[error("a {0} request is already pending")]
    AlreadyPending(&'static str),

    /// Chat text that cannot be framed: empty, or containing the delimiter.
    #[error("chat text must be non-empty and must not contain `!`")]
    InvalidChat,
}

/// Settings for one lobby connection.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address of the lobby's TCP port.
    pub server: SocketAddr,
    /// Identity sent in answer to `Hello`.
    pub identity: PlayerIdentity,
    /// Largest chunk read from the socket at once.
    pub read_limit: usize,
}

impl AgentConfig {
    pub fn new(server: SocketAddr, identity: PlayerIdentity) -> Self {
        Self {
            server,
            identity,
            read_limit: CLIENT_READ_LIMIT,
        }
    }
}

/// An invitation received from another player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteProposal {
    pub from_nickname: String,
    pub from_image: String,
    /// The connection the invitation arrived on.
    pub origin: SocketAddr,
    /// The inviter's code; answer with it in `accept_invitation` or
    /// `reject_invitation`.
    pub code: InviteCode,
}

struct Shared {
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    invite_code: watch::Receiver<Option<InviteCode>>,
    invite_reply: PendingSlot<bool>,
    players_reply: PendingSlot<Vec<PlayerIdentity>>,
    chats: Inbox<String>,
    moves: Inbox<Move>,
    proposals: Inbox<InviteProposal>,
}

/// Handle to a live lobby connection.  Cheap to clone.
#[derive(Clone)]
pub struct ProtocolAgent {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ProtocolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAgent")
            .field("peer", &self.shared.peer)
            .finish_non_exhaustive()
    }
}

impl ProtocolAgent {
    /// Connects to the lobby and spawns the receive loop.
    ///
    /// The loop runs until the lobby closes the connection or `running` is
    /// cleared; the returned handle completes when it has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConnectFailed`] if the TCP connection fails.
    pub async fn connect(
        config: AgentConfig,
        running: Arc<AtomicBool>,
    ) -> Result<(Self, JoinHandle<()>), AgentError> {
        let stream = TcpStream::connect(config.server)
            .await
            .map_err(|source| AgentError::ConnectFailed {
                addr: config.server,
                source,
            })?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        info!("connected to lobby at {peer}");

        let (code_tx, code_rx) = watch::channel(None);
        let (chat_tx, chats) = Inbox::channel();
        let (move_tx, moves) = Inbox::channel();
        let (proposal_tx, proposals) = Inbox::channel();

        let agent = Self {
            shared: Arc::new(Shared {
                peer,
                writer: Mutex::new(writer),
                invite_code: code_rx,
                invite_reply: PendingSlot::new("invite"),
                players_reply: PendingSlot::new("player list"),
                chats,
                moves,
                proposals,
            }),
        };

        let receiver = Receiver {
            agent: agent.clone(),
            identity: config.identity,
            code_tx,
            chat_tx,
            move_tx,
            proposal_tx,
        };
        let handle = tokio::spawn(receiver.run(reader, config.read_limit.max(1), running));

        Ok((agent, handle))
    }

    /// Address of the lobby.
    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer
    }

    /// Waits for the invite code the lobby issues after registration.
    ///
    /// # Errors
    ///
    /// [`AgentError::Closed`] if the connection ends without a code.
    pub async fn invite_code(&self) -> Result<InviteCode, AgentError> {
        let mut rx = self.shared.invite_code.clone();
        let code = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AgentError::Closed)?;
        code.clone().ok_or(AgentError::Closed)
    }

    /// Invites the player owning `code`.  The reply is `true` if they accept.
    pub async fn invite(&self, code: &InviteCode) -> Result<Reply<bool>, AgentError> {
        let reply = self.shared.invite_reply.arm()?;
        self.send(&ServerBound::InviteAsk { code: code.clone() })
            .await?;
        Ok(reply)
    }

    /// Accepts an invitation from the player owning `code`.
    pub async fn accept_invitation(&self, code: &InviteCode) -> Result<(), AgentError> {
        self.send(&ServerBound::InviteOk { code: code.clone() }).await
    }

    /// Declines an invitation from the player owning `code`.
    pub async fn reject_invitation(&self, code: &InviteCode) -> Result<(), AgentError> {
        self.send(&ServerBound::InviteRejected { code: code.clone() })
            .await
    }

    /// Asks for the list of registered players.
    pub async fn get_active_players(&self) -> Result<Reply<Vec<PlayerIdentity>>, AgentError> {
        let reply = self.shared.players_reply.arm()?;
        self.send(&ServerBound::GetPlayers).await?;
        Ok(reply)
    }

    /// Sends chat text to the opponent.
    pub async fn chat_send_msg(&self, text: &str) -> Result<(), AgentError> {
        let text = text.trim();
        if text.is_empty() || text.contains(DELIMITER) {
            return Err(AgentError::InvalidChat);
        }
        self.send(&ServerBound::Chat(text.to_string())).await
    }

    /// Sends a move to the opponent.
    pub async fn send_move(&self, mv: &Move) -> Result<(), AgentError> {
        self.send(&ServerBound::Move(mv.to_sendable())).await
    }

    /// Chat messages from the opponent.
    pub fn chats(&self) -> &Inbox<String> {
        &self.shared.chats
    }

    /// Moves from the opponent.
    pub fn moves(&self) -> &Inbox<Move> {
        &self.shared.moves
    }

    /// Invitations from other players.
    pub fn proposals(&self) -> &Inbox<InviteProposal> {
        &self.shared.proposals
    }

    async fn send(&self, message: &ServerBound) -> Result<(), AgentError> {
        let mut writer = self.shared.writer.lock().await;
        writer.write_all(message.encode().as_bytes()).await?;
        Ok(())
    }
}

/// State owned by the receive loop.
struct Receiver {
    agent: ProtocolAgent,
    identity: PlayerIdentity,
    code_tx: watch::Sender<Option<InviteCode>>,
    chat_tx: mpsc::UnboundedSender<String>,
    move_tx: mpsc::UnboundedSender<Move>,
    proposal_tx: mpsc::UnboundedSender<InviteProposal>,
}

impl Receiver {
    async fn run(self, mut reader: OwnedReadHalf, read_limit: usize, running: Arc<AtomicBool>) {
        let mut buf = vec![0u8; read_limit];

        while running.load(Ordering::Relaxed) {
            let n = match timeout(POLL_INTERVAL, reader.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    info!("lobby closed the connection");
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("read error on lobby connection: {e}");
                    break;
                }
            };

            for message in decode_bytes(&buf[..n]) {
                self.dispatch(&message).await;
            }
        }

        let shared = &self.agent.shared;
        shared.invite_reply.close();
        shared.players_reply.close();
        debug!("receive loop stopped");
    }

    async fn dispatch(&self, message: &str) {
        let shared = &self.agent.shared;
        let msg = match ClientBound::from_message(message) {
            Ok(msg) => msg,
            Err(ProtocolError::OddPlayerList(n)) => {
                error!("dropping player list with odd token count {n}");
                return;
            }
            Err(e) => {
                warn!("dropping message <{message}>: {e}");
                return;
            }
        };

        match msg {
            ClientBound::Hello => {
                let config = ServerBound::Config {
                    nickname: self.identity.nickname.clone(),
                    image: self.identity.profile_image.clone(),
                };
                if let Err(e) = self.agent.send(&config).await {
                    error!("failed to send config: {e}");
                }
            }
            ClientBound::ConfOk { code } => {
                let published = self.code_tx.send_if_modified(|current| {
                    if current.is_some() {
                        return false;
                    }
                    *current = Some(code.clone());
                    true
                });
                if published {
                    info!("registered with invite code {code}");
                } else {
                    debug!("ignoring repeated invite code {code}");
                }
            }
            ClientBound::ConfUserTaken => warn!("lobby: this connection was already registered"),
            ClientBound::ConfBadNick => warn!("lobby rejected the nickname"),
            ClientBound::ConfBadImg => warn!("lobby rejected the profile image"),
            ClientBound::Error(text) => warn!("lobby error: {text}"),
            ClientBound::Chat(text) => {
                let _ = self.chat_tx.send(text);
            }
            ClientBound::Move(payload) => match payload.parse::<Move>() {
                Ok(mv) => {
                    let _ = self.move_tx.send(mv);
                }
                Err(e) => warn!("dropping move: {e}"),
            },
            ClientBound::InviteAsk {
                nickname,
                image,
                code,
            } => {
                let _ = self.proposal_tx.send(InviteProposal {
                    from_nickname: nickname,
                    from_image: image,
                    origin: shared.peer,
                    code,
                });
            }
            ClientBound::InviteOk { .. } => {
                shared.invite_reply.fulfill(true);
            }
            ClientBound::InviteRejected => {
                shared.invite_reply.fulfill(false);
            }
            ClientBound::InviteErr => {
                warn!("lobby does not know that invite code");
                shared.invite_reply.fulfill(false);
            }
            ClientBound::OnlinePlayers(players) => {
                shared.players_reply.fulfill(players);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
