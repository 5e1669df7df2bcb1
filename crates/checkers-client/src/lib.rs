//! checkers-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the client do? (for beginners)
//!
//! A player's program talks to the lobby through a [`ProtocolAgent`].  The
//! agent:
//!
//! 1. Connects over TCP and answers the lobby's `Hello` with the player's
//!    identity.
//! 2. Remembers the invite code the lobby hands back, so the player can share
//!    it with a friend.
//! 3. Turns requests ("invite this code", "who is online?") into protocol
//!    messages and gives back a [`Reply`] that resolves when the answer
//!    arrives.
//! 4. Queues everything that arrives unasked (invitations, chat, moves) in
//!    inboxes the game can drain at its own pace.
//!
//! The `discovery` module finds lobbies on the LAN with a UDP probe.
//!
//! [`ProtocolAgent`]: infrastructure::network::ProtocolAgent
//! [`Reply`]: infrastructure::network::pending::Reply

/// Infrastructure layer: lobby connection and LAN discovery.
pub mod infrastructure;
