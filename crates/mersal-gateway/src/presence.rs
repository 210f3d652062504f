use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use mersal_types::events::ServerEvent;

/// Identifies one WebSocket connection. Minted per connection, never reused.
pub type ConnectionId = Uuid;

/// Targeted events for one connection.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Entry {
    conn_id: ConnectionId,
    outbox: Outbox,
}

/// Registry of online users: at most one live connection per user.
///
/// Every mutation broadcasts the change to all connected sessions. The
/// broadcast is sent while the write lock is still held, so subscribers see
/// presence events in exactly the order the mutations happened.
#[derive(Clone)]
pub struct Presence {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    /// Presence events; every connected session subscribes
    broadcast_tx: broadcast::Sender<ServerEvent>,

    /// user_id -> current connection
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

impl Presence {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(PresenceInner {
                broadcast_tx,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events sent to everyone. Subscribe before `record` to
    /// receive the online set that includes yourself.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Make `conn_id` the user's live connection, replacing any previous one,
    /// then broadcast the new online set. Returns the evicted connection.
    pub async fn record(&self, user_id: Uuid, conn_id: ConnectionId, outbox: Outbox) -> Option<ConnectionId> {
        let mut entries = self.inner.entries.write().await;
        let evicted = entries
            .insert(user_id, Entry { conn_id, outbox })
            .map(|previous| previous.conn_id);

        let online = sorted_ids(&entries);
        debug!(%user_id, %conn_id, online = online.len(), "presence recorded");
        let _ = self.inner.broadcast_tx.send(ServerEvent::GetOnlineUsers(online));

        evicted
    }

    /// Drop the user's entry, if any, and broadcast `userDisconnected`.
    /// Returns whether an entry was removed; absent users broadcast nothing.
    pub async fn remove(&self, user_id: Uuid) -> bool {
        let mut entries = self.inner.entries.write().await;
        if entries.remove(&user_id).is_none() {
            return false;
        }

        debug!(%user_id, online = entries.len(), "presence removed");
        let _ = self.inner.broadcast_tx.send(ServerEvent::UserDisconnected(user_id));
        true
    }

    /// Like `remove`, but only if `conn_id` is still the user's live
    /// connection. A superseded connection closing must not evict its successor.
    pub async fn release(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let mut entries = self.inner.entries.write().await;
        let is_current = entries
            .get(&user_id)
            .is_some_and(|entry| entry.conn_id == conn_id);
        if !is_current {
            return false;
        }

        entries.remove(&user_id);
        debug!(%user_id, %conn_id, online = entries.len(), "presence released");
        let _ = self.inner.broadcast_tx.send(ServerEvent::UserDisconnected(user_id));
        true
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.inner
            .entries
            .read()
            .await
            .get(&user_id)
            .map(|entry| entry.conn_id)
    }

    /// Online user ids at a single point in time, sorted.
    pub async fn snapshot(&self) -> Vec<Uuid> {
        sorted_ids(&*self.inner.entries.read().await)
    }

    /// Send a targeted event to the user's live connection. Returns false if
    /// the user is offline or the connection is already gone.
    pub async fn send_to(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let entries = self.inner.entries.read().await;
        match entries.get(&user_id) {
            Some(entry) => entry.outbox.send(event).is_ok(),
            None => false,
        }
    }
}

fn sorted_ids(entries: &HashMap<Uuid, Entry>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = entries.keys().copied().collect();
    ids.sort_unstable();
    ids
}
