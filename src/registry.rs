//! Connection registry: tracks every live connection plus process-wide
//! aggregate counters.
//!
//! The map and the counters are guarded by a single [`tokio::sync::Mutex`]
//! rather than independent atomics. `snapshot_globals` must return a
//! coherent tuple of all five counters; splitting them across independent
//! atomics would let a reader observe a torn snapshot (e.g.
//! `blocked_connections` incremented before `total_connections`), which
//! would violate the registry's own invariants.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// Direction of a byte transfer, from the proxy's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client -> origin.
    Out,
    /// Origin -> client.
    In,
}

/// The (source IP, source port) pair identifying one connection.
pub type ConnectionKey = (String, u16);

/// Per-connection bookkeeping, created once the request line has been
/// parsed and destroyed when either pipe of the connection terminates.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_host: String,
    pub method: String,
    pub start_time: chrono::DateTime<chrono::Local>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl ConnectionInfo {
    pub fn new(src_ip: String, src_port: u16, dst_host: String, method: String) -> Self {
        ConnectionInfo {
            src_ip,
            src_port,
            dst_host,
            method,
            start_time: chrono::Local::now(),
            bytes_in: 0,
            bytes_out: 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Globals {
    pub total_connections: u64,
    pub allowed_connections: u64,
    pub blocked_connections: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

struct Inner {
    connections: HashMap<ConnectionKey, ConnectionInfo>,
    globals: Globals,
}

/// Process-wide connection registry. Shared behind an `Arc` by the
/// supervisor and every handler/pipe task it spawns.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: Mutex::new(Inner {
                connections: HashMap::new(),
                globals: Globals::default(),
            }),
        }
    }

    /// Inserts `info` under `key`. Returns `Err` if the key is already
    /// present — a duplicate key indicates a bug in the accept loop, since
    /// (source IP, source port) is assumed unique for the connection's
    /// lifetime.
    pub async fn register(&self, key: ConnectionKey, info: ConnectionInfo) -> Result<(), ConnectionKey> {
        let mut inner = self.inner.lock().await;
        if inner.connections.contains_key(&key) {
            return Err(key);
        }
        inner.connections.insert(key, info);
        Ok(())
    }

    /// Removes and returns the entry for `key`, if present. Idempotent: a
    /// second call for the same key returns `None`.
    pub async fn remove(&self, key: &ConnectionKey) -> Option<ConnectionInfo> {
        self.inner.lock().await.connections.remove(key)
    }

    /// Adds `n_bytes` to the per-connection and global counter for
    /// `direction`. No-ops silently if `key` is absent (the connection may
    /// have already been removed by the peer pipe).
    pub async fn add_traffic(&self, key: &ConnectionKey, direction: Direction, n_bytes: u64) {
        let mut inner = self.inner.lock().await;
        let had_entry = if let Some(info) = inner.connections.get_mut(key) {
            match direction {
                Direction::Out => info.bytes_out += n_bytes,
                Direction::In => info.bytes_in += n_bytes,
            }
            true
        } else {
            false
        };
        if had_entry {
            match direction {
                Direction::Out => inner.globals.bytes_out += n_bytes,
                Direction::In => inner.globals.bytes_in += n_bytes,
            }
        }
    }

    pub async fn record_total(&self) {
        self.inner.lock().await.globals.total_connections += 1;
    }

    pub async fn record_allowed(&self) {
        self.inner.lock().await.globals.allowed_connections += 1;
    }

    pub async fn record_blocked(&self) {
        self.inner.lock().await.globals.blocked_connections += 1;
    }

    /// Returns a coherent snapshot of all global counters.
    pub async fn snapshot_globals(&self) -> Globals {
        self.inner.lock().await.globals
    }

    /// Number of currently-live connections. Exposed for tests and stats.
    pub async fn live_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
