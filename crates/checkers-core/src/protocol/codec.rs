//! Text codec for the checkers lobby protocol.
//!
//! Wire format:
//! ```text
//! checkers:<verb>[ <arg>]*!checkers:<verb>[ <arg>]*!...
//! ```
//! A message is the `checkers:` prefix, a verb, and whitespace-separated
//! arguments.  Messages are concatenated with `!`; a trailing `!` is optional.
//!
//! # Framing contract
//!
//! Framing is per read: every chunk returned by one `read` call is assumed to
//! hold whole, self-terminated messages.  A message whose bytes are split
//! across two reads is **not** reassembled; each half is decoded on its own
//! and will most likely be rejected as malformed.  Senders in this workspace
//! terminate every message with `!` so that replies written back-to-back can
//! still be separated when a single read returns several of them.

use thiserror::Error;

use crate::domain::DomainError;

/// Prefix carried by token 0 of every message.
pub const PREFIX: &str = "checkers:";

/// Separator between concatenated messages.
pub const DELIMITER: char = '!';

/// Largest chunk the lobby reads from a connection in one go.
pub const SERVER_READ_LIMIT: usize = 1024;

/// Largest chunk the client agent reads from its connection in one go.
pub const CLIENT_READ_LIMIT: usize = 100;

/// Errors raised while parsing a single message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message was empty after trimming.
    #[error("empty message")]
    Empty,

    /// Token 0 did not start with `checkers:`.
    #[error("missing `checkers:` prefix in `{0}`")]
    MissingPrefix(String),

    /// The verb is not part of the protocol for this direction.
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),

    /// The verb was followed by the wrong number of arguments.
    #[error("`{verb}` expects {expected} argument(s), got {got}")]
    Arity {
        verb: String,
        expected: usize,
        got: usize,
    },

    /// `onlinePlayers` carried an odd number of tokens.
    #[error("player list has odd token count {0}")]
    OddPlayerList(usize),

    /// An invite code argument had the wrong shape.
    #[error("invalid invite code in `{verb}`: {source}")]
    InvalidInviteCode {
        verb: String,
        #[source]
        source: DomainError,
    },
}

/// A tokenized message: verb plus arguments, borrowing from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage<'a> {
    /// The verb with the `checkers:` prefix removed.
    pub verb: &'a str,
    /// Whitespace-separated tokens after the verb.
    pub args: Vec<&'a str>,
    /// Everything after the verb, leading whitespace removed.  Used by verbs
    /// whose single argument may itself contain spaces (`chat`).
    pub rest: &'a str,
}

impl<'a> RawMessage<'a> {
    /// Fails unless exactly `expected` arguments are present.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Arity`] on mismatch.
    pub fn expect_args(&self, expected: usize) -> Result<&[&'a str], ProtocolError> {
        if self.args.len() != expected {
            return Err(ProtocolError::Arity {
                verb: self.verb.to_string(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(&self.args)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Splits one read chunk into its ordered message strings.
///
/// Surrounding whitespace is trimmed, one trailing `!` is dropped, and the
/// remainder is split on `!`.  Empty fragments (an empty chunk, or `!!`) are
/// skipped; they could never parse as a message.
///
/// # Examples
///
/// ```rust
/// use checkers_core::decode_chunk;
///
/// let chunk = "checkers:getPlayers!checkers:inviteAsk abc123def456!\n";
/// assert_eq!(
///     decode_chunk(chunk),
///     vec!["checkers:getPlayers", "checkers:inviteAsk abc123def456"]
/// );
/// ```
pub fn decode_chunk(chunk: &str) -> Vec<&str> {
    let trimmed = chunk.trim();
    let body = trimmed.strip_suffix(DELIMITER).unwrap_or(trimmed);
    body.split(DELIMITER)
        .filter(|message| !message.is_empty())
        .collect()
}

/// Converts raw bytes from a read into text and splits them into messages.
///
/// Invalid UTF-8 is replaced rather than rejected; any resulting garbage
/// fails later in [`parse_message`].
pub fn decode_bytes(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    decode_chunk(&text).into_iter().map(str::to_string).collect()
}

/// Tokenizes a single message.
///
/// # Errors
///
/// Returns [`ProtocolError::Empty`] for blank input and
/// [`ProtocolError::MissingPrefix`] when token 0 is not `checkers:<verb>`.
pub fn parse_message(message: &str) -> Result<RawMessage<'_>, ProtocolError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let (head, rest) = match message.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (message, ""),
    };

    let verb = head
        .strip_prefix(PREFIX)
        .filter(|verb| !verb.is_empty())
        .ok_or_else(|| ProtocolError::MissingPrefix(head.to_string()))?;

    Ok(RawMessage {
        verb,
        args: rest.split_whitespace().collect(),
        rest,
    })
}

/// Frames a verb and its arguments as one terminated wire message.
pub fn frame<S: AsRef<str>>(verb: &str, args: &[S]) -> String {
    let mut out = String::with_capacity(PREFIX.len() + verb.len() + 1 + args.len() * 16);
    out.push_str(PREFIX);
    out.push_str(verb);
    for arg in args {
        out.push(' ');
        out.push_str(arg.as_ref());
    }
    out.push(DELIMITER);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
