//! Server core: the session registry, handshake, and command dispatch.
//!
//! A [`Server`] owns every registered session and channel behind one
//! reader-writer lock. New connections go through [`Server::join`], which
//! negotiates an identity on the caller's task and then hands the session
//! to a spawned dispatch loop.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::channel::Channel;
use super::codec::CodecError;
use super::message::Message;
use super::session::{id, Identity, Session};

/// Server identity: derived from the system hostname at startup.
pub static SERVER_NAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| h.contains('.'))
        .unwrap_or_else(|| "shoal.chat".into())
});

/// How many messages a connection may send before it must have completed
/// registration.
const HANDSHAKE_ATTEMPTS: usize = 5;

/// Errors that abort a connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("handshake failed")]
    HandshakeFailed,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Everything guarded by the registry lock.
struct State<C> {
    /// Registered sessions, keyed by lowercased nick.
    users: HashMap<String, Arc<Session<C>>>,
    /// Channels, keyed by lowercased name.
    channels: HashMap<String, Arc<Channel>>,
    /// Monotonic counter behind `Guest<n>` fallback nicks.
    guest_count: u64,
}

/// The session registry. Generic over the transport so tests can drive it
/// with in-memory pipes.
pub struct Server<C> {
    state: RwLock<State<C>>,
    created: SystemTime,
}

impl<C> Server<C> {
    pub fn new() -> Self {
        Server {
            state: RwLock::new(State {
                users: HashMap::new(),
                channels: HashMap::new(),
                guest_count: 0,
            }),
            created: SystemTime::now(),
        }
    }

    /// When this registry was created.
    pub fn created(&self) -> SystemTime {
        self.created
    }
}

impl<C> Default for Server<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: AsyncRead + AsyncWrite + Send + 'static> Server<C> {
    /// Take ownership of a fresh session: negotiate its identity, then start
    /// its dispatch loop.
    ///
    /// The handshake runs on the caller's task; once it completes, the
    /// dispatch loop is spawned and this returns. On failure the connection
    /// is closed and nothing keeps the session alive.
    pub async fn join(self: &Arc<Self>, session: Session<C>) -> Result<(), ServerError> {
        let session = Arc::new(session);
        if let Err(e) = self.handshake(&session).await {
            let _ = session.close().await;
            return Err(e);
        }

        let server = Arc::clone(self);
        tokio::spawn(async move { server.handle(session).await });
        Ok(())
    }

    /// Negotiate an identity on an unregistered connection.
    ///
    /// Reads at most [`HANDSHAKE_ATTEMPTS`] messages. `NICK` stages a nick,
    /// `USER` supplies the account and real name and triggers registration;
    /// anything else, including messages without parameters, consumes an
    /// attempt. On a nick conflict a `Guest<n>` nick is minted and applied,
    /// and registration is retried exactly once.
    async fn handshake(&self, session: &Arc<Session<C>>) -> Result<(), ServerError> {
        let mut identity = Identity::default();

        for _ in 0..HANDSHAKE_ATTEMPTS {
            let msg = session.decode().await?;
            if msg.params.is_empty() {
                continue;
            }

            match msg.command.to_uppercase().as_str() {
                "NICK" => {
                    identity.nick = msg.params[0].clone();
                }
                "USER" => {
                    identity.account = msg.params[0].clone();
                    identity.real = msg.trailing.clone().unwrap_or_default();
                    session.set_identity(identity.clone()).await;

                    if !self.register(session).await {
                        // Nick taken: fall back to a guest nick, one retry.
                        identity.nick = self.guest_nick().await;
                        session.set_identity(identity.clone()).await;
                        if !self.register(session).await {
                            return Err(ServerError::HandshakeFailed);
                        }
                    }

                    let welcome = Message {
                        prefix: Some(SERVER_NAME.clone()),
                        command: "001".into(), // RPL_WELCOME
                        params: vec![identity.account.clone()],
                        trailing: Some("Welcome!".into()),
                    };
                    if let Err(e) = session.encode(welcome).await {
                        // A failed join must leave no registry entry behind.
                        self.state.write().await.users.remove(&identity.id());
                        return Err(e.into());
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        Err(ServerError::HandshakeFailed)
    }

    /// Add a session to the registry under its current id. Fails without
    /// side effects if the id is already taken; the check and insert happen
    /// under one exclusive lock.
    pub async fn register(&self, session: &Arc<Session<C>>) -> bool {
        let user_id = session.id().await;
        let mut state = self.state.write().await;
        if state.users.contains_key(&user_id) {
            return false;
        }
        state.users.insert(user_id, Arc::clone(session));
        true
    }

    /// Mint the next fallback nick.
    async fn guest_nick(&self) -> String {
        let mut state = self.state.write().await;
        state.guest_count += 1;
        format!("Guest{}", state.guest_count)
    }

    /// Look up a registered session by nick, case-insensitively.
    pub async fn user(&self, name: &str) -> Option<Arc<Session<C>>> {
        self.state.read().await.users.get(&id(name)).cloned()
    }

    /// Get or create the channel with this name.
    pub async fn channel(&self, name: &str) -> Arc<Channel> {
        let mut state = self.state.write().await;
        Arc::clone(
            state
                .channels
                .entry(id(name))
                .or_insert_with(|| Arc::new(Channel::new(name))),
        )
    }

    /// Whether a channel with this name exists, case-insensitively.
    pub async fn has_channel(&self, name: &str) -> bool {
        self.state.read().await.channels.contains_key(&id(name))
    }

    /// Build the reply sequence for a `NAMES` query: one `353` per known
    /// channel, then a single `366`. Unknown channels produce no `353`. The
    /// end reply names the channel only when exactly one was requested.
    pub async fn names_report(&self, nick: &str, channels: &[String]) -> Vec<Message> {
        let state = self.state.read().await;
        let mut replies = Vec::new();

        for name in channels {
            let channel = match state.channels.get(&id(name)) {
                Some(channel) => channel,
                None => continue,
            };
            replies.push(Message {
                prefix: Some(SERVER_NAME.clone()),
                command: "353".into(), // RPL_NAMREPLY
                params: vec![nick.to_owned(), "=".into(), name.clone()],
                trailing: Some(channel.names().await.join(" ")),
            });
        }

        let mut params = vec![nick.to_owned()];
        if channels.len() == 1 {
            params.push(channels[0].clone());
        }
        replies.push(Message {
            prefix: Some(SERVER_NAME.clone()),
            command: "366".into(), // RPL_ENDOFNAMES
            params,
            trailing: Some("End of /NAMES list.".into()),
        });

        replies
    }

    /// Dispatch loop for a registered session. Runs until the client quits
    /// or the transport fails; the connection is closed on the way out.
    async fn handle(&self, session: Arc<Session<C>>) {
        loop {
            let msg = match session.decode().await {
                Ok(msg) => msg,
                Err(e) => {
                    let user = session.id().await;
                    warn!(user = %user, "decode error: {e}");
                    break;
                }
            };

            let sent = match msg.command.to_uppercase().as_str() {
                "QUIT" => break,

                "PING" => {
                    session
                        .encode(Message {
                            prefix: Some(SERVER_NAME.clone()),
                            command: "PONG".into(),
                            params: msg.params,
                            trailing: msg.trailing,
                        })
                        .await
                }

                "JOIN" => {
                    // Channels are invite-only from the wire; membership is
                    // managed by the embedding process.
                    session
                        .encode(Message {
                            prefix: Some(SERVER_NAME.clone()),
                            command: "473".into(), // ERR_INVITEONLYCHAN
                            params: vec![],
                            trailing: Some("Cannot join channel (+i)".into()),
                        })
                        .await
                }

                "NAMES" => {
                    if msg.params.is_empty() {
                        continue;
                    }
                    let nick = session.nick().await;
                    let replies = self.names_report(&nick, &msg.params[..1]).await;
                    session.encode_many(replies).await
                }

                // Message relay is outside this core.
                "PRIVMSG" => continue,

                _ => continue,
            };

            if let Err(e) = sent {
                let user = session.id().await;
                warn!(user = %user, "encode error: {e}");
                break;
            }
        }

        let user = session.id().await;
        let _ = session.close().await;
        info!(user = %user, "disconnected");
    }
}

/// Run the relay on the given addresses.
///
/// Binds to every address in the slice and accepts connections on all of
/// them.
pub async fn run(addrs: &[&str]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server: Arc<Server<TcpStream>> = Arc::new(Server::new());

    // Bind all listeners first, so we fail fast on port conflicts.
    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let listener = TcpListener::bind(addr).await?;
        info!("shoal listening on {addr}");
        listeners.push(listener);
    }

    // Spawn an accept loop per listener.
    let mut handles = Vec::new();
    for listener in listeners {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(accept_loop(listener, server)));
    }

    // Wait for any listener to exit (they shouldn't).
    for handle in handles {
        handle.await??;
    }

    Ok(())
}

/// Accept loop for a single listener.
async fn accept_loop(
    listener: TcpListener,
    server: Arc<Server<TcpStream>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (socket, addr) = listener.accept().await?;
        info!(%addr, "new connection");
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let session = Session::new(socket, addr.ip().to_string());
            match server.join(session).await {
                Ok(()) => info!(%addr, "registered"),
                Err(e) => warn!(%addr, "handshake failed: {e}"),
            }
        });
    }
}
