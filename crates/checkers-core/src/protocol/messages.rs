//! Typed protocol messages, one enum per direction.
//!
//! The same verb can mean different things depending on who sends it:
//! `inviteAsk` carries just a code when a client asks the lobby, but a full
//! identity plus code when the lobby forwards it.  Keeping the two directions
//! in separate enums makes that impossible to mix up.

use crate::domain::invite_code::InviteCode;
use crate::domain::player::PlayerIdentity;
use crate::protocol::codec::{frame, parse_message, ProtocolError, RawMessage};

// ── Verb names ────────────────────────────────────────────────────────────────

pub const VERB_HELLO: &str = "Hello";
pub const VERB_CONFIG: &str = "config";
pub const VERB_CONF_OK: &str = "confOk";
pub const VERB_CONF_USER_TAKEN: &str = "confUserTaken";
pub const VERB_CONF_BAD_NICK: &str = "confBadNick";
pub const VERB_CONF_BAD_IMG: &str = "confBadImg";
pub const VERB_ERROR: &str = "error";
pub const VERB_GET_PLAYERS: &str = "getPlayers";
pub const VERB_ONLINE_PLAYERS: &str = "onlinePlayers";
pub const VERB_INVITE_ASK: &str = "inviteAsk";
pub const VERB_INVITE_ERR: &str = "inviteErr";
pub const VERB_INVITE_OK: &str = "inviteOk";
pub const VERB_INVITE_REJECTED: &str = "inviteRejected";
pub const VERB_CHAT: &str = "chat";
pub const VERB_MOVE: &str = "move";

/// Text of the duplicate-nickname error reply.
pub const USER_ALREADY_PRESENT: &str = "user already present";

fn invite_code(verb: &str, text: &str) -> Result<InviteCode, ProtocolError> {
    InviteCode::parse(text).map_err(|source| ProtocolError::InvalidInviteCode {
        verb: verb.to_string(),
        source,
    })
}

fn non_empty_rest<'a>(raw: &RawMessage<'a>) -> Result<&'a str, ProtocolError> {
    if raw.rest.is_empty() {
        return Err(ProtocolError::Arity {
            verb: raw.verb.to_string(),
            expected: 1,
            got: 0,
        });
    }
    Ok(raw.rest)
}

// ── Client → lobby ────────────────────────────────────────────────────────────

/// Messages a client sends to the lobby (and, once in a session, to its peer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerBound {
    /// Register an identity.  Fields are base64 text, validated by the lobby.
    Config { nickname: String, image: String },
    /// Request the list of active players.
    GetPlayers,
    /// Invite the player owning `code`.
    InviteAsk { code: InviteCode },
    /// Decline the invitation received from the player owning `code`.
    InviteRejected { code: InviteCode },
    /// Accept the invitation received from the player owning `code`.
    InviteOk { code: InviteCode },
    /// Chat text; may contain spaces.
    Chat(String),
    /// Move payload in wire form, relayed verbatim.
    Move(String),
}

impl ServerBound {
    /// Converts a tokenized message into a typed one.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownVerb`] for verbs a client never sends,
    /// [`ProtocolError::Arity`] for wrong argument counts, and
    /// [`ProtocolError::InvalidInviteCode`] for codes of the wrong length.
    pub fn parse(raw: &RawMessage<'_>) -> Result<Self, ProtocolError> {
        match raw.verb {
            VERB_CONFIG => {
                let args = raw.expect_args(2)?;
                Ok(Self::Config {
                    nickname: args[0].to_string(),
                    image: args[1].to_string(),
                })
            }
            VERB_GET_PLAYERS => {
                raw.expect_args(0)?;
                Ok(Self::GetPlayers)
            }
            VERB_INVITE_ASK => {
                let args = raw.expect_args(1)?;
                Ok(Self::InviteAsk {
                    code: invite_code(raw.verb, args[0])?,
                })
            }
            VERB_INVITE_REJECTED => {
                let args = raw.expect_args(1)?;
                Ok(Self::InviteRejected {
                    code: invite_code(raw.verb, args[0])?,
                })
            }
            VERB_INVITE_OK => {
                let args = raw.expect_args(1)?;
                Ok(Self::InviteOk {
                    code: invite_code(raw.verb, args[0])?,
                })
            }
            VERB_CHAT => Ok(Self::Chat(non_empty_rest(raw)?.to_string())),
            VERB_MOVE => {
                let args = raw.expect_args(1)?;
                Ok(Self::Move(args[0].to_string()))
            }
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }

    /// Tokenizes and parses one message string.
    ///
    /// # Errors
    ///
    /// See [`parse_message`] and [`ServerBound::parse`].
    pub fn from_message(message: &str) -> Result<Self, ProtocolError> {
        Self::parse(&parse_message(message)?)
    }

    /// Renders the message in wire form, terminated with `!`.
    pub fn encode(&self) -> String {
        match self {
            Self::Config { nickname, image } => frame(VERB_CONFIG, &[nickname, image]),
            Self::GetPlayers => frame::<&str>(VERB_GET_PLAYERS, &[]),
            Self::InviteAsk { code } => frame(VERB_INVITE_ASK, &[code.as_str()]),
            Self::InviteRejected { code } => frame(VERB_INVITE_REJECTED, &[code.as_str()]),
            Self::InviteOk { code } => frame(VERB_INVITE_OK, &[code.as_str()]),
            Self::Chat(text) => frame(VERB_CHAT, &[text]),
            Self::Move(payload) => frame(VERB_MOVE, &[payload]),
        }
    }
}

// ── Lobby → client ────────────────────────────────────────────────────────────

/// Messages a client receives from the lobby (and, once in a session, from its peer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientBound {
    /// Greeting sent right after the lobby accepts a connection.
    Hello,
    /// Identity registered; carries the connection's invite code.
    ConfOk { code: InviteCode },
    /// This connection already registered an identity.
    ConfUserTaken,
    /// The nickname is not base64.
    ConfBadNick,
    /// The profile image is not base64.
    ConfBadImg,
    /// Free-form error text, e.g. `user already present`.
    Error(String),
    /// Every active identity.
    OnlinePlayers(Vec<PlayerIdentity>),
    /// Someone invites this player.
    InviteAsk {
        nickname: String,
        image: String,
        code: InviteCode,
    },
    /// The invite code asked for is unknown.
    InviteErr,
    /// The invited player accepted.
    InviteOk { code: InviteCode },
    /// The invited player declined.
    InviteRejected,
    /// Chat text from the opponent.
    Chat(String),
    /// Move payload from the opponent, still in wire form.
    Move(String),
}

impl ClientBound {
    /// Converts a tokenized message into a typed one.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownVerb`] for verbs the lobby never sends,
    /// [`ProtocolError::Arity`] for wrong argument counts, and
    /// [`ProtocolError::OddPlayerList`] when `onlinePlayers` cannot be paired up.
    pub fn parse(raw: &RawMessage<'_>) -> Result<Self, ProtocolError> {
        match raw.verb {
            VERB_HELLO => Ok(Self::Hello),
            VERB_CONF_OK => {
                let args = raw.expect_args(1)?;
                Ok(Self::ConfOk {
                    code: invite_code(raw.verb, args[0])?,
                })
            }
            VERB_CONF_USER_TAKEN => Ok(Self::ConfUserTaken),
            VERB_CONF_BAD_NICK => Ok(Self::ConfBadNick),
            VERB_CONF_BAD_IMG => Ok(Self::ConfBadImg),
            VERB_ERROR => Ok(Self::Error(raw.rest.to_string())),
            VERB_ONLINE_PLAYERS => {
                if raw.args.len() % 2 != 0 {
                    return Err(ProtocolError::OddPlayerList(raw.args.len()));
                }
                Ok(Self::OnlinePlayers(
                    raw.args
                        .chunks_exact(2)
                        .map(|pair| PlayerIdentity::new(pair[0], pair[1]))
                        .collect(),
                ))
            }
            VERB_INVITE_ASK => {
                let args = raw.expect_args(3)?;
                Ok(Self::InviteAsk {
                    nickname: args[0].to_string(),
                    image: args[1].to_string(),
                    code: invite_code(raw.verb, args[2])?,
                })
            }
            VERB_INVITE_ERR => Ok(Self::InviteErr),
            VERB_INVITE_OK => {
                let args = raw.expect_args(1)?;
                Ok(Self::InviteOk {
                    code: invite_code(raw.verb, args[0])?,
                })
            }
            VERB_INVITE_REJECTED => Ok(Self::InviteRejected),
            VERB_CHAT => Ok(Self::Chat(non_empty_rest(raw)?.to_string())),
            VERB_MOVE => {
                let args = raw.expect_args(1)?;
                Ok(Self::Move(args[0].to_string()))
            }
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }

    /// Tokenizes and parses one message string.
    ///
    /// # Errors
    ///
    /// See [`parse_message`] and [`ClientBound::parse`].
    pub fn from_message(message: &str) -> Result<Self, ProtocolError> {
        Self::parse(&parse_message(message)?)
    }

    /// Renders the message in wire form, terminated with `!`.
    pub fn encode(&self) -> String {
        match self {
            Self::Hello => frame::<&str>(VERB_HELLO, &[]),
            Self::ConfOk { code } => frame(VERB_CONF_OK, &[code.as_str()]),
            Self::ConfUserTaken => frame::<&str>(VERB_CONF_USER_TAKEN, &[]),
            Self::ConfBadNick => frame::<&str>(VERB_CONF_BAD_NICK, &[]),
            Self::ConfBadImg => frame::<&str>(VERB_CONF_BAD_IMG, &[]),
            Self::Error(text) => frame(VERB_ERROR, &[text]),
            Self::OnlinePlayers(players) => {
                let tokens: Vec<&str> = players
                    .iter()
                    .flat_map(|p| [p.nickname.as_str(), p.profile_image.as_str()])
                    .collect();
                frame(VERB_ONLINE_PLAYERS, &tokens)
            }
            Self::InviteAsk {
                nickname,
                image,
                code,
            } => frame(
                VERB_INVITE_ASK,
                &[nickname.as_str(), image.as_str(), code.as_str()],
            ),
            Self::InviteErr => frame::<&str>(VERB_INVITE_ERR, &[]),
            Self::InviteOk { code } => frame(VERB_INVITE_OK, &[code.as_str()]),
            Self::InviteRejected => frame::<&str>(VERB_INVITE_REJECTED, &[]),
            Self::Chat(text) => frame(VERB_CHAT, &[text]),
            Self::Move(payload) => frame(VERB_MOVE, &[payload]),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
