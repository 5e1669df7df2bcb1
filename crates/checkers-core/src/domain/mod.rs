//! Domain value types shared by the lobby and the client agent.
//!
//! Nothing in here touches the network.  The types are the vocabulary the
//! protocol layer speaks: who a player is ([`player::PlayerIdentity`]), how a
//! player is addressed for matchmaking ([`invite_code::InviteCode`]), and what
//! a move payload looks like ([`moves::Move`]).

use thiserror::Error;

pub mod base64;
pub mod invite_code;
pub mod moves;
pub mod player;

/// Validation errors raised while building domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A nickname was empty.
    #[error("nickname is empty")]
    EmptyNickname,

    /// A field that must be base64 contains a character outside the alphabet
    /// or has an impossible length.
    #[error("{field} is not valid base64")]
    InvalidBase64 { field: &'static str },

    /// An invite code did not have exactly [`invite_code::INVITE_CODE_LEN`] characters.
    #[error("invite code must be {expected} characters, got {got}")]
    InviteCodeLength { expected: usize, got: usize },

    /// A move payload did not follow the `row,col>row,col` grammar.
    #[error("malformed move `{0}`")]
    MalformedMove(String),
}
