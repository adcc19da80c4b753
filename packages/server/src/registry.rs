//! Connection registry: the set of open peer connections.
//!
//! The registry is the only shared mutable state in the server. The
//! container sits behind a single `RwLock`; callers only get the
//! operations below and never touch the map itself.
//!
//! Each [`PeerConnection`] owns the write half of its transport behind its
//! own lock, so a peer receiving broadcasts from many origins at once gets
//! one write at a time. A pending write, or a wait for that lock, ends as
//! soon as the connection is closed.

use std::{
    collections::HashMap,
    fmt,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, RwLock},
};
use tokio_util::sync::CancellationToken;

/// Write half of a peer transport.
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opaque handle of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One open peer connection.
pub struct PeerConnection {
    id: ConnectionId,
    addr: SocketAddr,
    /// `None` once the connection has been closed
    writer: Mutex<Option<PeerWriter>>,
    cancel: CancellationToken,
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection already closed")
}

impl PeerConnection {
    fn new(id: ConnectionId, addr: SocketAddr, writer: PeerWriter) -> Self {
        Self {
            id,
            addr,
            writer: Mutex::new(Some(writer)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write `bytes` to the peer and flush.
    ///
    /// Fails with `NotConnected` once the connection has been closed,
    /// including when [`close`](Self::close) is called while this write is
    /// still waiting on a peer that does not read.
    pub async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(not_connected()),
            result = self.write(bytes) => result,
        }
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(not_connected)?;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Close the transport. Idempotent: only the first call shuts the
    /// writer down; later calls return `false`.
    ///
    /// Cancels any pending [`send`](Self::send) first, so the writer lock is
    /// released even when the peer has stopped reading.
    pub async fn close(&self) -> bool {
        self.cancel.cancel();

        let Some(mut writer) = self.writer.lock().await.take() else {
            return false;
        };
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Error shutting down connection {}: {}", self.id, e);
        }
        true
    }

    /// Resolve once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

/// Entry removed from the registry, returned for logging.
#[derive(Debug)]
pub struct RemovedPeer {
    pub connection: Arc<PeerConnection>,
    pub username: Option<String>,
}

struct Entry {
    connection: Arc<PeerConnection>,
    username: Option<String>,
}

/// Registry of open connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. The returned connection's [`id`](PeerConnection::id)
    /// is the handle for every later operation.
    pub async fn register<W>(&self, writer: W, addr: SocketAddr) -> Arc<PeerConnection>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(PeerConnection::new(id, addr, Box::new(writer)));
        self.entries.write().await.insert(
            id,
            Entry {
                connection: connection.clone(),
                username: None,
            },
        );
        connection
    }

    /// Record the username last claimed on `id`. No-op for unknown handles.
    pub async fn update_username(&self, id: ConnectionId, username: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(&id)
            && entry.username.as_deref() != Some(username)
        {
            entry.username = Some(username.to_string());
        }
    }

    /// Every registered connection except `id`, in registration order.
    pub async fn snapshot_except(&self, id: ConnectionId) -> Vec<Arc<PeerConnection>> {
        let mut peers: Vec<Arc<PeerConnection>> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(entry_id, _)| **entry_id != id)
            .map(|(_, entry)| entry.connection.clone())
            .collect();
        peers.sort_by_key(|peer| peer.id());
        peers
    }

    /// Remove `id`. Returns `None` when it was already removed.
    pub async fn remove(&self, id: ConnectionId) -> Option<RemovedPeer> {
        self.entries
            .write()
            .await
            .remove(&id)
            .map(|entry| RemovedPeer {
                connection: entry.connection,
                username: entry.username,
            })
    }

    /// Remove every entry at once, for server shutdown.
    pub async fn drain(&self) -> Vec<RemovedPeer> {
        let mut removed: Vec<RemovedPeer> = self
            .entries
            .write()
            .await
            .drain()
            .map(|(_, entry)| RemovedPeer {
                connection: entry.connection,
                username: entry.username,
            })
            .collect();
        removed.sort_by_key(|peer| peer.connection.id());
        removed
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Claimed usernames, in registration order.
    #[cfg(test)]
    pub(crate) async fn usernames(&self) -> Vec<Option<String>> {
        let entries = self.entries.read().await;
        let mut ids: Vec<&ConnectionId> = entries.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| entries[id].username.clone())
            .collect()
    }
}
