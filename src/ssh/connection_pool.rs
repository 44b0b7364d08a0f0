//! Per-host connection pool
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ConnectionPool<C: Connector>                            │
//! │  DashMap<"user@host", PoolSlot>                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  PoolSlot                                          │  │
//! │  │  ├── attempt: u64                                  │  │
//! │  │  ├── created_at                                    │  │
//! │  │  └── connect: Shared<BoxFuture<Result<Conn, _>>>   │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every requester of a key awaits the same shared connect future, so a key
//! is dialed at most once no matter how many callers race for it. A failed
//! dial removes its slot; a successful one keeps it until the transport's
//! close notification fires. Removal always checks the attempt id, so a late
//! close event never evicts a newer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::error::SshError;
use crate::fs::FileOperations;

/// A live connection the pool can hand out
#[async_trait]
pub trait PooledConnection: Clone + Send + Sync + 'static {
    /// Fires once when the transport closes
    fn subscribe_close(&self) -> broadcast::Receiver<()>;

    fn is_connected(&self) -> bool;

    fn file_operations(&self) -> Arc<dyn FileOperations>;

    async fn close(&self);
}

/// Dials connections for the pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: PooledConnection;

    async fn connect(&self, host: &str, username: &str) -> Result<Self::Connection, SshError>;
}

type ConnectFuture<T> = Shared<BoxFuture<'static, Result<T, SshError>>>;

struct PoolSlot<T> {
    attempt: u64,
    created_at: DateTime<Utc>,
    connect: ConnectFuture<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntryInfo {
    pub key: String,
    pub attempt: u64,
    pub state: SlotState,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPoolStats {
    pub total_connections: usize,
    pub connected: usize,
    pub connecting: usize,
    pub entries: Vec<PoolEntryInfo>,
}

/// Pool key for `username@host`
pub fn pool_key(host: &str, username: &str) -> String {
    format!("{}@{}", username, host)
}

pub struct ConnectionPool<C: Connector> {
    connector: Arc<C>,
    slots: Arc<DashMap<String, PoolSlot<C::Connection>>>,
    next_attempt: AtomicU64,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            slots: Arc::new(DashMap::new()),
            next_attempt: AtomicU64::new(1),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Pooled connection for `username@host`, dialing if needed.
    ///
    /// `connect_timeout` bounds a dial started by this call; joining an
    /// in-flight dial keeps that dial's own deadline.
    pub async fn get(
        &self,
        host: &str,
        username: &str,
        connect_timeout: Duration,
    ) -> Result<C::Connection, SshError> {
        let key = pool_key(host, username);

        // The entry guard must be released before awaiting
        let connect = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let stale = matches!(
                    occupied.get().connect.peek(),
                    Some(Ok(conn)) if !conn.is_connected()
                );
                if stale {
                    debug!("Replacing disconnected pool entry {}", key);
                    let slot = self.new_slot(host, username, &key, connect_timeout);
                    let connect = slot.connect.clone();
                    occupied.insert(slot);
                    connect
                } else {
                    debug!("Reusing pool entry {}", key);
                    occupied.get().connect.clone()
                }
            }
            Entry::Vacant(vacant) => {
                let slot = self.new_slot(host, username, &key, connect_timeout);
                let connect = slot.connect.clone();
                vacant.insert(slot);
                connect
            }
        };

        connect.await
    }

    fn new_slot(
        &self,
        host: &str,
        username: &str,
        key: &str,
        timeout: Duration,
    ) -> PoolSlot<C::Connection> {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let connector = self.connector.clone();
        let slots = self.slots.clone();
        let host = host.to_string();
        let username = username.to_string();
        let key = key.to_string();

        let connect = async move {
            info!("Connecting {} (attempt {})", key, attempt);
            let start = Instant::now();

            let result = match tokio::time::timeout(timeout, connector.connect(&host, &username)).await
            {
                Ok(result) => result,
                Err(_) => Err(SshError::Timeout(format!(
                    "connection to {} timed out after {}ms",
                    key,
                    timeout.as_millis()
                ))),
            };

            info!("{}ms for connect {}", start.elapsed().as_millis(), key);

            match &result {
                Ok(conn) => watch_close(slots, key, attempt, conn),
                Err(e) => {
                    warn!("Connect {} failed: {}", key, e);
                    slots.remove_if(&key, |_, slot| slot.attempt == attempt);
                }
            }

            result
        }
        .boxed()
        .shared();

        PoolSlot {
            attempt,
            created_at: Utc::now(),
            connect,
        }
    }

    /// Remove and close the entry for `username@host`. No-op when absent.
    pub async fn close(&self, host: &str, username: &str) {
        let key = pool_key(host, username);
        let Some((_, slot)) = self.slots.remove(&key) else {
            return;
        };

        if let Some(Ok(conn)) = slot.connect.peek() {
            let conn = conn.clone();
            conn.close().await;
        }
        info!("Closed pool entry {}", key);
    }

    pub async fn close_all(&self) {
        let keys: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        info!("Closing {} pooled connections", keys.len());

        for key in keys {
            let Some((_, slot)) = self.slots.remove(&key) else {
                continue;
            };
            if let Some(Ok(conn)) = slot.connect.peek() {
                let conn = conn.clone();
                conn.close().await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, host: &str, username: &str) -> bool {
        self.slots.contains_key(&pool_key(host, username))
    }

    pub fn stats(&self) -> ConnectionPoolStats {
        let entries: Vec<PoolEntryInfo> = self
            .slots
            .iter()
            .map(|entry| {
                let slot = entry.value();
                let state = match slot.connect.peek() {
                    None => SlotState::Connecting,
                    Some(Ok(conn)) if conn.is_connected() => SlotState::Connected,
                    Some(_) => SlotState::Disconnected,
                };
                PoolEntryInfo {
                    key: entry.key().clone(),
                    attempt: slot.attempt,
                    state,
                    created_at: slot.created_at.to_rfc3339(),
                }
            })
            .collect();

        ConnectionPoolStats {
            total_connections: entries.len(),
            connected: entries
                .iter()
                .filter(|e| e.state == SlotState::Connected)
                .count(),
            connecting: entries
                .iter()
                .filter(|e| e.state == SlotState::Connecting)
                .count(),
            entries,
        }
    }
}

/// Evict the slot once the transport reports close
fn watch_close<T: PooledConnection>(
    slots: Arc<DashMap<String, PoolSlot<T>>>,
    key: String,
    attempt: u64,
    conn: &T,
) {
    let mut close_rx = conn.subscribe_close();

    // Closed before we subscribed
    if !conn.is_connected() {
        slots.remove_if(&key, |_, slot| slot.attempt == attempt);
        return;
    }

    tokio::spawn(async move {
        // Ok, Closed and Lagged all mean the transport is gone
        let _ = close_rx.recv().await;
        if slots
            .remove_if(&key, |_, slot| slot.attempt == attempt)
            .is_some()
        {
            info!("Connection {} closed, removed from pool", key);
        }
    });
}
