//! # checkers-core
//!
//! Shared library for the LAN checkers lobby containing the text protocol
//! codec, the typed wire messages, and the small domain types both sides of a
//! connection agree on (player identity, invite code, move grammar).
//!
//! This crate is used by both the lobby server and the client agent.
//! It has no dependencies on sockets, threads, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! Players on the same LAN find each other through a UDP probe, then connect
//! to a *lobby* over TCP.  The lobby hands out a short invite code to every
//! player, forwards invitations between them, and once an invitation is
//! accepted it hands both connections over to a dedicated match session.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How text travels over the network.  Messages look like
//!   `checkers:<verb> <arg> <arg>` and are concatenated with `!`.
//!
//! - **`domain`** – Pure value types: [`PlayerIdentity`], [`InviteCode`],
//!   [`Move`], and the base64 helpers used to validate identity fields.

pub mod domain;
pub mod protocol;

pub use domain::invite_code::InviteCode;
pub use domain::moves::{Move, Square};
pub use domain::player::PlayerIdentity;
pub use domain::DomainError;
pub use protocol::codec::{decode_chunk, parse_message, ProtocolError, RawMessage};
pub use protocol::messages::{ClientBound, ServerBound};
