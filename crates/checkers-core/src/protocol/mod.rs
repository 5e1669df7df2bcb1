//! Protocol module containing the text codec, the typed messages and the
//! LAN discovery datagrams.

pub mod codec;
pub mod discovery;
pub mod messages;

pub use codec::{decode_bytes, decode_chunk, frame, parse_message, ProtocolError, RawMessage};
pub use messages::{ClientBound, ServerBound};
