//! Client sessions: one transport connection plus its negotiated identity.
//!
//! A [`Session`] owns both halves of a framed connection. The read half is
//! consumed one message at a time by the handshake and dispatch loops; the
//! write half serializes replies. Each half sits behind its own lock so a
//! slow write never blocks a concurrent read.

use std::io;

use futures::SinkExt;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use super::codec::{CodecError, IrcCodec};
use super::message::Message;

/// Canonical identifier for a nick or channel name.
///
/// Names that differ only in case map to the same identifier; the registry
/// keys its maps on this.
pub fn id(name: &str) -> String {
    name.to_lowercase()
}

/// Who a session claims to be.
///
/// Filled in piecewise during the handshake: `NICK` supplies the nick,
/// `USER` supplies the account and real name, and the host comes from the
/// transport when the session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub nick: String,
    pub account: String,
    pub real: String,
    pub host: String,
}

impl Identity {
    /// The registry key for this identity.
    pub fn id(&self) -> String {
        id(&self.nick)
    }

    /// Render as an IRC origin prefix (`nick[!account][@host]`).
    pub fn prefix(&self) -> String {
        let mut out = self.nick.clone();
        if !self.account.is_empty() {
            out.push('!');
            out.push_str(&self.account);
        }
        if !self.host.is_empty() {
            out.push('@');
            out.push_str(&self.host);
        }
        out
    }

    /// Merge in another identity. Only non-empty fields overwrite; an empty
    /// field in `update` leaves the current value alone.
    pub fn update(&mut self, update: Identity) {
        if !update.nick.is_empty() {
            self.nick = update.nick;
        }
        if !update.account.is_empty() {
            self.account = update.account;
        }
        if !update.real.is_empty() {
            self.real = update.real;
        }
        if !update.host.is_empty() {
            self.host = update.host;
        }
    }
}

/// One client connection: framed transport halves plus identity.
pub struct Session<C> {
    reader: Mutex<FramedRead<ReadHalf<C>, IrcCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<C>, IrcCodec>>,
    identity: Mutex<Identity>,
}

impl<C: AsyncRead + AsyncWrite> Session<C> {
    /// Wrap a fresh connection. `host` is the peer address, recorded as the
    /// host portion of the session's identity.
    pub fn new(conn: C, host: String) -> Self {
        let (reader, writer) = split(conn);
        Session {
            reader: Mutex::new(FramedRead::new(reader, IrcCodec)),
            writer: Mutex::new(FramedWrite::new(writer, IrcCodec)),
            identity: Mutex::new(Identity {
                host,
                ..Identity::default()
            }),
        }
    }

    /// Snapshot of the current identity.
    pub async fn identity(&self) -> Identity {
        self.identity.lock().await.clone()
    }

    /// Apply a partial identity update (see [`Identity::update`]).
    pub async fn set_identity(&self, update: Identity) {
        self.identity.lock().await.update(update);
    }

    /// The session's registry key (lowercased nick).
    pub async fn id(&self) -> String {
        self.identity.lock().await.id()
    }

    /// The session's nick as negotiated.
    pub async fn nick(&self) -> String {
        self.identity.lock().await.nick.clone()
    }

    /// Read the next message from the connection.
    ///
    /// A closed connection surfaces as an I/O error, so both the handshake
    /// and the dispatch loop observe disconnects through their normal error
    /// paths.
    pub async fn decode(&self) -> Result<Message, CodecError> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(msg)) => {
                debug!("<- {msg}");
                Ok(msg)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
        }
    }

    /// Write a single message to the connection and flush it.
    pub async fn encode(&self, msg: Message) -> Result<(), CodecError> {
        debug!("-> {msg}");
        let mut writer = self.writer.lock().await;
        writer.send(msg).await
    }

    /// Write a batch of messages in order, stopping at the first failure.
    /// The whole batch goes out under one writer lock so replies from
    /// concurrent tasks cannot interleave into the middle of it.
    pub async fn encode_many(&self, msgs: Vec<Message>) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        for msg in msgs {
            debug!("-> {msg}");
            writer.send(msg).await?;
        }
        Ok(())
    }

    /// Flush and shut down the write half of the connection.
    pub async fn close(&self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}
