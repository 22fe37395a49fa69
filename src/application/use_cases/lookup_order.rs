/// Lookup Order Use Case
///
/// Resolves an order identifier: cache first, durable store on a miss.
///
/// ## Workflow
/// 1. Parse the request payload (`LookupRequest::parse`)
/// 2. `OrderCache::get`; a hit is answered directly
/// 3. On a miss, `OrderStore::get_by_key` bounded by the op timeout
/// 4. Build exactly one `LookupResponse`: found, not found or error
///
/// With `read_through` enabled a store hit is admitted into the cache unless
/// the key became resident in the meantime; otherwise the lookup path never mutates the cache or the store.

use crate::application::error::LookupError;
use crate::application::use_cases::ingest_order::DEFAULT_OP_TIMEOUT;
use crate::domain::cache::OrderCache;
use crate::domain::order::Order;
use crate::domain::ports::OrderStore;
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{LookupRequest, LookupResponse, ResolvedFrom};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of resolving a single identifier
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found {
        order: Arc<Order>,
        source: ResolvedFrom,
    },
    NotFound,
}

/// Lookup Order Use Case
pub struct LookupOrderUseCase {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    read_through: bool,
    op_timeout: Duration,
}

impl LookupOrderUseCase {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self {
            store,
            cache,
            read_through: false,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_read_through(mut self, read_through: bool) -> Self {
        self.read_through = read_through;
        self
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Resolves `order_uid` against the cache, then the store
    pub async fn execute(&self, order_uid: &str) -> Result<LookupOutcome, LookupError> {
        if let Some(order) = self.cache.get(order_uid) {
            METRICS.cache_lookups.with_label_values(&["hit"]).inc();
            return Ok(LookupOutcome::Found {
                order,
                source: ResolvedFrom::Cache,
            });
        }
        METRICS.cache_lookups.with_label_values(&["miss"]).inc();

        let fetched = tokio::time::timeout(self.op_timeout, self.store.get_by_key(order_uid))
            .await
            .map_err(|_| LookupError::Timeout(self.op_timeout))??;

        let Some(order) = fetched else {
            return Ok(LookupOutcome::NotFound);
        };
        let order = Arc::new(order);

        if self.read_through {
            // 已驻留的值可能比这次读到的更新，只在缺失时回填
            match self.cache.admit_if_absent(order_uid, order.clone()).await {
                Some(admission) => {
                    debug!(order_uid, evicted = ?admission.evicted, "read-through admission")
                }
                None => debug!(order_uid, "read-through skipped, key already resident"),
            }
        }

        Ok(LookupOutcome::Found {
            order,
            source: ResolvedFrom::Store,
        })
    }

    /// Turns a raw request payload into its one response
    pub async fn respond(&self, payload: &[u8]) -> LookupResponse {
        let request = match LookupRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                let err = LookupError::from(e);
                METRICS.lookup_total.with_label_values(&["error"]).inc();
                warn!(error = %err, "unparseable lookup request");
                return LookupResponse::Error {
                    order_uid: None,
                    kind: err.kind(),
                    message: err.to_string(),
                };
            }
        };

        let order_uid = request.order_uid;
        match self.execute(&order_uid).await {
            Ok(LookupOutcome::Found { order, source }) => {
                METRICS.lookup_total.with_label_values(&[source.as_str()]).inc();
                debug!(order_uid = %order_uid, source = source.as_str(), "order resolved");
                LookupResponse::Found {
                    order_uid,
                    source,
                    order,
                }
            }
            Ok(LookupOutcome::NotFound) => {
                METRICS.lookup_total.with_label_values(&["not_found"]).inc();
                debug!(order_uid = %order_uid, "order not found");
                LookupResponse::NotFound { order_uid }
            }
            Err(e) => {
                METRICS.lookup_total.with_label_values(&["error"]).inc();
                warn!(order_uid = %order_uid, error = %e, "lookup failed");
                LookupResponse::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                    order_uid: Some(order_uid),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::{MemorySnapshotStore, MemoryStore};
    use crate::shared::fixtures::sample_order;
    use crate::domain::ports::StoreError;
    use crate::shared::protocol::LookupErrorKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    fn setup(capacity: usize) -> (Arc<MemoryStore>, Arc<OrderCache>) {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        (
            Arc::new(MemoryStore::new()),
            Arc::new(OrderCache::new(capacity, snapshot).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_cache_hit() {
        let (store, cache) = setup(3);
        cache.admit("o1", Arc::new(sample_order("o1"))).await;

        let use_case = LookupOrderUseCase::new(store, cache);
        match use_case.execute("o1").await.unwrap() {
            LookupOutcome::Found { source, order } => {
                assert_eq!(source, ResolvedFrom::Cache);
                assert_eq!(order.order_uid, "o1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_fallback_returns_stored_record() {
        let (store, cache) = setup(3);
        let stored = sample_order("o1");
        store.insert(&stored).await.unwrap();

        let use_case = LookupOrderUseCase::new(store, cache.clone());
        let outcome = use_case.execute("o1").await.unwrap();

        assert_eq!(
            outcome,
            LookupOutcome::Found {
                order: Arc::new(stored),
                source: ResolvedFrom::Store,
            }
        );
        // 默认不回填缓存
        assert!(!cache.contains("o1"));
    }

    #[tokio::test]
    async fn test_read_through_admits_store_hit() {
        let (store, cache) = setup(3);
        store.insert(&sample_order("o1")).await.unwrap();

        let use_case = LookupOrderUseCase::new(store, cache.clone()).with_read_through(true);
        use_case.execute("o1").await.unwrap();
        assert!(cache.contains("o1"));

        match use_case.execute("o1").await.unwrap() {
            LookupOutcome::Found { source, .. } => assert_eq!(source, ResolvedFrom::Cache),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    /// 读取后暂停，直到测试放行
    struct GatedReads {
        inner: MemoryStore,
        read_done: Notify,
        release: Notify,
    }

    #[async_trait]
    impl OrderStore for GatedReads {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            self.inner.insert(order).await
        }

        async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
            self.inner.upsert(order).await
        }

        async fn get_by_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
            let result = self.inner.get_by_key(key).await;
            self.read_done.notify_one();
            self.release.notified().await;
            result
        }

        async fn get_many_by_keys(&self, keys: &[String]) -> Result<HashMap<String, Order>, StoreError> {
            self.inner.get_many_by_keys(keys).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn test_read_through_never_replaces_newer_resident_value() {
        let store = Arc::new(GatedReads {
            inner: MemoryStore::new(),
            read_done: Notify::new(),
            release: Notify::new(),
        });
        let cache = Arc::new(OrderCache::new(3, Arc::new(MemorySnapshotStore::new())).unwrap());

        let mut older = sample_order("o1");
        older.entry = "OLDER".to_string();
        store.inner.insert(&older).await.unwrap();

        let use_case = LookupOrderUseCase::new(store.clone(), cache.clone()).with_read_through(true);
        let lookup = tokio::spawn(async move { use_case.execute("o1").await });

        // 查询已读到旧值，此时摄取写入新值并进入缓存
        store.read_done.notified().await;
        let mut newer = sample_order("o1");
        newer.entry = "NEWER".to_string();
        store.inner.upsert(&newer).await.unwrap();
        cache.admit("o1", Arc::new(newer)).await;
        store.release.notify_one();

        let outcome = lookup.await.unwrap().unwrap();
        assert!(matches!(outcome, LookupOutcome::Found { source: ResolvedFrom::Store, .. }));

        assert_eq!(cache.get("o1").unwrap().entry, "NEWER");
        assert_eq!(store.inner.get_by_key("o1").await.unwrap().unwrap().entry, "NEWER");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_anywhere() {
        let (store, cache) = setup(3);
        let use_case = LookupOrderUseCase::new(store, cache);

        assert_eq!(use_case.execute("ghost").await.unwrap(), LookupOutcome::NotFound);
        assert_eq!(
            use_case.respond(b"ghost").await,
            LookupResponse::NotFound {
                order_uid: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_store_error_becomes_error_response() {
        let (store, cache) = setup(3);
        store.fail_reads(true);

        let use_case = LookupOrderUseCase::new(store, cache);
        let response = use_case.respond(br#"{"order_uid": "o1"}"#).await;

        match response {
            LookupResponse::Error { order_uid, kind, .. } => {
                assert_eq!(order_uid.as_deref(), Some("o1"));
                assert_eq!(kind, LookupErrorKind::Io);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_request_gets_error_response() {
        let (store, cache) = setup(3);
        let use_case = LookupOrderUseCase::new(store, cache);

        let response = use_case.respond(b"   ").await;
        assert!(response.is_error());
        assert_eq!(response.order_uid(), None);
    }
}
