//! Application layer for the lobby.
//!
//! Nothing here performs I/O.  The multiplexer feeds decoded messages in and
//! executes the [`matchmaking::LobbyAction`]s that come back out, which keeps
//! every matchmaking rule testable without a socket.
//!
//! # Sub-modules
//!
//! - **`directory`** – The bidirectional nickname and invite-code mappings plus
//!   the set of active identities.
//!
//! - **`matchmaking`** – The per-message state machine: registration, player
//!   listing, invitation forwarding, and the decision to hand two connections
//!   off into a match session.

pub mod directory;
pub mod matchmaking;

pub use directory::{BiMap, ConnId, Directory, DirectoryError};
pub use matchmaking::{LobbyAction, Matchmaker};
