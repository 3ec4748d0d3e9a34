//! Channels: named member lists that sessions can be added to.
//!
//! Joining a channel over the wire is refused in this server, but channels
//! still exist as registry entries so an embedding process can populate
//! them and clients can list their members with `NAMES`.

use std::collections::BTreeSet;

use tokio::sync::RwLock;

use super::session::id;

/// A named group of members. The display name keeps the case it was first
/// created with; lookups go through the lowercased id.
#[derive(Debug)]
pub struct Channel {
    name: String,
    id: String,
    members: RwLock<BTreeSet<String>>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Channel {
            name: name.to_owned(),
            id: id(name),
            members: RwLock::new(BTreeSet::new()),
        }
    }

    /// The display name, as given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical lookup key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a member by nick. Adding the same nick twice is a no-op.
    pub async fn join(&self, nick: &str) {
        self.members.write().await.insert(nick.to_owned());
    }

    /// The member nicks, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }
}
