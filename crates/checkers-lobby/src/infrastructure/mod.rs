//! Infrastructure layer for the lobby.
//!
//! Contains the OS-facing adapters: the TCP multiplexer, the session handoff
//! and relay, the UDP discovery responder, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `checkers_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
