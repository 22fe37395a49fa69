/// Ports - collaborator interfaces the domain depends on
///
/// The eviction cache and the two paths never talk to a database or a file
/// directly; they go through these traits. Implementations live in the
/// infrastructure layer (`PgStore`, `MemoryStore`, `FileSnapshotStore`, ...),
/// which keeps the domain testable with in-memory doubles.

use crate::domain::order::Order;
use async_trait::async_trait;
use std::collections::HashMap;

/// Durable store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An order with this key already exists
    #[error("order '{0}' already exists")]
    Conflict(String),

    /// Connection, pool or query failure
    #[error("store I/O error: {0}")]
    Io(String),

    /// A stored row could not be assembled into an order
    #[error("stored order is corrupt: {0}")]
    Corrupt(String),
}

/// Durable store - the authoritative copy of every ingested order
///
/// Implementations must write an order and its three sub-entities in a
/// single atomic transaction.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order
    ///
    /// Returns `StoreError::Conflict` if the key already exists; nothing is
    /// written in that case.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Inserts the order, replacing any existing order with the same key
    async fn upsert(&self, order: &Order) -> Result<(), StoreError>;

    /// Fetches a single order with its sub-entities
    async fn get_by_key(&self, key: &str) -> Result<Option<Order>, StoreError>;

    /// Fetches every order whose key is in `keys`
    ///
    /// Keys with no stored order are simply absent from the result.
    async fn get_many_by_keys(&self, keys: &[String]) -> Result<HashMap<String, Order>, StoreError>;

    /// Cheap connectivity check used by readiness probes
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Snapshot store errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not a key list: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Side-channel persistence for the set of cache-resident keys
///
/// The snapshot is not authoritative; it only tells a restarting process
/// which orders to pull back from the durable store.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replaces the persisted key list
    async fn write(&self, keys: &[String]) -> Result<(), SnapshotError>;

    /// Reads the persisted key list, `Ok(None)` if nothing was ever written
    async fn read(&self) -> Result<Option<Vec<String>>, SnapshotError>;
}
