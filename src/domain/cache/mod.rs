/// Eviction Cache - bounded FIFO cache of orders with a restorable key snapshot
///
/// `OrderCache` maps order keys to orders and holds at most `capacity` of
/// them. Replacement is FIFO in admission order: when a new key arrives and
/// the slot under the cursor is still live, the key in that slot (the oldest
/// surviving admission) is evicted.
///
/// ## Concurrency
/// - Internal state sits behind a `parking_lot::RwLock`; `get` takes the read
///   lock for one map lookup and an `Arc` clone, no other allocation.
/// - `admit`/`delete` hold the write lock only for the map + ring update.
///   The lock is never held across store or snapshot I/O.
/// - Snapshot writes are serialized and always capture the state after the
///   mutation that triggered them, so an older key list never overwrites a
///   newer one.
///
/// ## Snapshot
/// After every mutation the resident key list (oldest admission first) is
/// written to the `SnapshotStore`. A failed write is reported in the
/// returned `Admission` but never undoes the mutation.
///
/// ## Restart
/// `OrderCache::open` reads the snapshot, bulk-fetches those keys from the
/// durable store and seeds the ring in snapshot order. Any failure on that
/// path yields a cold (empty) cache instead.
///
/// ## Example
/// ```rust,ignore
/// let cache = OrderCache::open(1000, snapshot, store.as_ref()).await?;
/// let admission = cache.admit(order.key(), Arc::new(order)).await;
/// assert!(cache.get("b563feb7b2b84b6test").is_some());
/// ```

pub mod ring;

pub use ring::{Installed, SlotRing};

use crate::domain::order::Order;
use crate::domain::ports::{OrderStore, SnapshotError, SnapshotStore};
use crate::shared::metrics::METRICS;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors raised while constructing a cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,
}

/// How an admission changed the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionKind {
    /// Key was not resident and now occupies a slot
    Inserted,
    /// Key was resident; its value was overwritten in place
    Replaced,
}

/// Result of `OrderCache::admit`
#[derive(Debug)]
pub struct Admission {
    pub kind: AdmissionKind,

    /// Key evicted to make room, if any
    pub evicted: Option<String>,

    /// Outcome of the snapshot write that followed the mutation
    pub snapshot: Result<(), SnapshotError>,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub resident: usize,
    pub cursor: usize,
}

struct CacheEntry {
    slot: usize,
    order: Arc<Order>,
}

struct CacheState {
    entries: HashMap<Arc<str>, CacheEntry>,
    ring: SlotRing,
}

impl CacheState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            ring: SlotRing::with_capacity(capacity),
        }
    }

    fn install(&mut self, key: Arc<str>, order: Arc<Order>) -> Option<Arc<str>> {
        let Installed { slot, displaced } = self.ring.install(key.clone());

        if let Some(old) = &displaced {
            self.entries.remove(old);
        }
        self.entries.insert(key, CacheEntry { slot, order });

        debug_assert_eq!(self.entries.len(), self.ring.live_count());
        displaced
    }
}

/// Bounded FIFO order cache
pub struct OrderCache {
    state: RwLock<CacheState>,
    snapshot: Arc<dyn SnapshotStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl OrderCache {
    /// Creates an empty cache
    pub fn new(capacity: usize, snapshot: Arc<dyn SnapshotStore>) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }

        Ok(Self {
            state: RwLock::new(CacheState::with_capacity(capacity)),
            snapshot,
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Creates a cache pre-populated from fetched records
    ///
    /// Keys are installed in the order given; keys with no record in
    /// `records` (deleted from the store since the snapshot) are skipped,
    /// as are duplicates. If more than `capacity` keys survive, the newest
    /// ones (towards the end of `keys`) are kept.
    pub fn seeded(
        capacity: usize,
        keys: &[String],
        mut records: HashMap<String, Order>,
        snapshot: Arc<dyn SnapshotStore>,
    ) -> Result<Self, CacheError> {
        let cache = Self::new(capacity, snapshot)?;

        {
            let mut state = cache.state.write();
            for key in keys {
                if state.entries.contains_key(key.as_str()) {
                    continue;
                }
                if let Some(order) = records.remove(key) {
                    state.install(Arc::from(key.as_str()), Arc::new(order));
                }
            }
            METRICS.cache_resident.set(state.entries.len() as f64);
        }

        Ok(cache)
    }

    /// Rebuilds a cache from the last snapshot and the durable store
    ///
    /// Returns `None` (start cold) when the snapshot is absent or unreadable,
    /// or when the bulk fetch fails.
    pub async fn restore(
        capacity: usize,
        snapshot: Arc<dyn SnapshotStore>,
        store: &dyn OrderStore,
    ) -> Option<Self> {
        let keys = match snapshot.read().await {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                info!("no cache snapshot found");
                return None;
            }
            Err(e) => {
                METRICS.snapshot_failures.with_label_values(&["read"]).inc();
                warn!(error = %e, "cache snapshot unreadable");
                return None;
            }
        };

        let keys = newest_unique(keys, capacity);

        let records = match store.get_many_by_keys(&keys).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, keys = keys.len(), "bulk fetch for cache restore failed");
                return None;
            }
        };

        let missing = keys.len().saturating_sub(records.len());
        let cache = Self::seeded(capacity, &keys, records, snapshot).ok()?;
        info!(
            resident = cache.len(),
            missing,
            "cache restored from snapshot"
        );

        Some(cache)
    }

    /// Returns a ready cache: restored when possible, cold otherwise
    ///
    /// A restored cache immediately rewrites the snapshot so that keys no
    /// longer present in the store drop out of it.
    pub async fn open(
        capacity: usize,
        snapshot: Arc<dyn SnapshotStore>,
        store: &dyn OrderStore,
    ) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }

        match Self::restore(capacity, snapshot.clone(), store).await {
            Some(cache) => {
                if let Err(e) = cache.persist().await {
                    warn!(error = %e, "failed to rewrite snapshot after restore");
                }
                Ok(cache)
            }
            None => {
                info!(capacity, "starting with a cold cache");
                Self::new(capacity, snapshot)
            }
        }
    }

    /// Looks up a resident order
    #[inline]
    pub fn get(&self, key: &str) -> Option<Arc<Order>> {
        self.state
            .read()
            .entries
            .get(key)
            .map(|entry| entry.order.clone())
    }

    /// Whether `key` is resident
    pub fn contains(&self, key: &str) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Admits an order under `key`
    ///
    /// - resident key: value overwritten in place; admission order, cursor
    ///   and resident count are unchanged
    /// - new key: installed at the cursor slot, evicting the oldest surviving
    ///   key if that slot is live; cursor advances by one
    ///
    /// The snapshot is written afterwards; its outcome is reported in the
    /// returned `Admission`.
    pub async fn admit(&self, key: &str, order: Arc<Order>) -> Admission {
        let (kind, evicted) = {
            let mut state = self.state.write();

            if let Some(entry) = state.entries.get_mut(key) {
                entry.order = order;
                (AdmissionKind::Replaced, None)
            } else {
                let evicted = state.install(Arc::from(key), order);
                METRICS.cache_resident.set(state.entries.len() as f64);
                (AdmissionKind::Inserted, evicted.map(|k| k.to_string()))
            }
        };

        self.complete_admission(key, kind, evicted).await
    }

    /// Admits an order only if `key` is not resident
    ///
    /// Returns `None` without touching the cache or the snapshot when the
    /// key is already resident, so a value read earlier from the store never
    /// replaces a newer resident one.
    pub async fn admit_if_absent(&self, key: &str, order: Arc<Order>) -> Option<Admission> {
        let evicted = {
            let mut state = self.state.write();
            if state.entries.contains_key(key) {
                return None;
            }

            let evicted = state.install(Arc::from(key), order);
            METRICS.cache_resident.set(state.entries.len() as f64);
            evicted.map(|k| k.to_string())
        };

        Some(self.complete_admission(key, AdmissionKind::Inserted, evicted).await)
    }

    async fn complete_admission(
        &self,
        key: &str,
        kind: AdmissionKind,
        evicted: Option<String>,
    ) -> Admission {
        match kind {
            AdmissionKind::Inserted => {
                METRICS.cache_admissions.with_label_values(&["inserted"]).inc()
            }
            AdmissionKind::Replaced => {
                METRICS.cache_admissions.with_label_values(&["replaced"]).inc()
            }
        }
        if let Some(old) = &evicted {
            METRICS.cache_evictions.with_label_values(&["fifo"]).inc();
            debug!(order_uid = key, evicted = %old, "evicted oldest cache entry");
        }

        let snapshot = self.persist().await;

        Admission {
            kind,
            evicted,
            snapshot,
        }
    }

    /// Removes `key` from the cache
    ///
    /// The freed slot is not compacted; it is reused when the cursor next
    /// reaches it. Returns whether anything was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            match state.entries.remove(key) {
                Some(entry) => {
                    state.ring.release(entry.slot);
                    METRICS.cache_resident.set(state.entries.len() as f64);
                    true
                }
                None => false,
            }
        };

        if removed {
            METRICS.cache_evictions.with_label_values(&["delete"]).inc();
            if let Err(e) = self.persist().await {
                warn!(order_uid = key, error = %e, "snapshot write after delete failed");
            }
        }

        removed
    }

    /// Resident keys, oldest admission first
    pub fn resident_keys(&self) -> Vec<String> {
        self.state
            .read()
            .ring
            .live_keys()
            .map(|key| key.to_string())
            .collect()
    }

    /// Number of resident orders
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.read().ring.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            capacity: state.ring.capacity(),
            resident: state.entries.len(),
            cursor: state.ring.cursor(),
        }
    }

    /// Writes the current resident key list to the snapshot store
    pub async fn persist(&self) -> Result<(), SnapshotError> {
        // 先拿到写入锁再读状态：保证后写入的快照不会比先写入的旧
        let _guard = self.persist_lock.lock().await;
        let keys = self.resident_keys();

        let result = self.snapshot.write(&keys).await;
        if result.is_err() {
            METRICS.snapshot_failures.with_label_values(&["write"]).inc();
        }
        result
    }
}

/// Deduplicates `keys` and keeps at most `capacity` of the newest ones
fn newest_unique(keys: Vec<String>, capacity: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    let mut newest: Vec<String> = keys
        .into_iter()
        .rev()
        .filter(|key| seen.insert(key.clone()))
        .take(capacity)
        .collect();
    newest.reverse();
    newest
}
