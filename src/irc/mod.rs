//! IRC protocol plumbing: wire model, codec, sessions, channels, and the
//! server registry that ties them together.

pub mod channel;
pub mod codec;
pub mod message;
pub mod server;
pub mod session;
