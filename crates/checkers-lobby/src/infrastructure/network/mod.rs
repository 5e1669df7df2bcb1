//! Network infrastructure for the lobby.
//!
//! # Sub-modules
//!
//! - **`multiplexer`** – The single task that owns the TCP listener and every
//!   lobby connection.  It waits for whichever socket becomes readable, feeds
//!   the decoded messages to the [`Matchmaker`](crate::application::Matchmaker)
//!   and carries out the resulting actions.
//!
//! - **`handoff`** – The seam between the lobby and a match session: the
//!   [`SessionRelay`](handoff::SessionRelay) trait and the blocking sockets it
//!   receives.
//!
//! - **`relay`** – The default session relay, which forwards `chat` and `move`
//!   between the two players on a pair of threads.
//!
//! - **`discovery`** – Answers `checkers:probe` UDP datagrams with this
//!   lobby's identity so clients can find it without typing an address.

pub mod discovery;
pub mod handoff;
pub mod multiplexer;
pub mod relay;
