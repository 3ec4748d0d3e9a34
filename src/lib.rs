//! Shoal: the session core of a minimal IRC-style chat relay.
//!
//! Covers the connection lifecycle from accept to disconnect: CR-LF line
//! framing, the registration handshake with guest-nick fallback, a shared
//! session and channel registry, and a per-session command dispatch loop.
//! Message relay between sessions sits above this crate.

pub mod irc;
