//! Infrastructure layer for the client.
//!
//! - **`network`** – the [`ProtocolAgent`](network::ProtocolAgent) driving one
//!   lobby connection.
//! - **`discovery`** – the UDP probe that finds lobbies on the LAN.

pub mod discovery;
pub mod network;
