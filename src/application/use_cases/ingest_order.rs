/// Ingest Order Use Case
///
/// Turns one inbound order payload into a durable store write followed by a
/// cache admission.
///
/// ## Workflow
/// 1. Decode the JSON payload into an `Order`
/// 2. Validate it (`OrderValidator`)
/// 3. Write it to the durable store in one transaction (`insert`, or
///    `upsert` under `ConflictPolicy::Upsert`)
/// 4. Admit it into the cache
///
/// The store write is the durability boundary: once it succeeds the
/// ingestion has succeeded, whatever happens to the snapshot write that
/// follows the admission. A failure at steps 1-3 never touches the cache.
///
/// ## Example
/// ```rust,ignore
/// let use_case = IngestOrderUseCase::new(store, cache, OrderValidator::new());
/// let order = use_case.decode(&payload)?;
/// let admission = use_case.ingest(order).await?;
/// ```

use crate::application::error::IngestError;
use crate::domain::cache::{Admission, OrderCache};
use crate::domain::order::Order;
use crate::domain::ports::OrderStore;
use crate::domain::validation::OrderValidator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single store call
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when an ingested key already exists in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ConflictPolicy {
    /// Report a conflict and leave the stored order untouched
    #[default]
    Reject,
    /// Replace the stored order and all of its sub-entities
    Upsert,
}

/// Ingest Order Use Case
pub struct IngestOrderUseCase {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    validator: OrderValidator,
    policy: ConflictPolicy,
    op_timeout: Duration,
}

impl IngestOrderUseCase {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>, validator: OrderValidator) -> Self {
        Self {
            store,
            cache,
            validator,
            policy: ConflictPolicy::default(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decodes an inbound payload
    pub fn decode(&self, payload: &[u8]) -> Result<Order, IngestError> {
        Ok(Order::from_json(payload)?)
    }

    /// Validates, stores and admits an order
    pub async fn ingest(&self, order: Order) -> Result<Admission, IngestError> {
        self.validator.validate(&order)?;

        let write = async {
            match self.policy {
                ConflictPolicy::Reject => self.store.insert(&order).await,
                ConflictPolicy::Upsert => self.store.upsert(&order).await,
            }
        };
        tokio::time::timeout(self.op_timeout, write)
            .await
            .map_err(|_| IngestError::Timeout(self.op_timeout))??;

        let key = order.order_uid.clone();
        let admission = self.cache.admit(&key, Arc::new(order)).await;

        if let Err(e) = &admission.snapshot {
            warn!(order_uid = %key, error = %e, "snapshot write after admission failed");
        }
        debug!(order_uid = %key, kind = ?admission.kind, evicted = ?admission.evicted, "order admitted");

        Ok(admission)
    }

    /// Decodes and ingests in one step
    pub async fn execute(&self, payload: &[u8]) -> Result<Admission, IngestError> {
        let order = self.decode(payload)?;
        self.ingest(order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::AdmissionKind;
    use crate::infrastructure::storage::{MemorySnapshotStore, MemoryStore};
    use crate::shared::fixtures::sample_order;
    use crate::shared::protocol::RejectKind;

    struct Harness {
        store: Arc<MemoryStore>,
        cache: Arc<OrderCache>,
        snapshot: Arc<MemorySnapshotStore>,
    }

    fn harness(capacity: usize) -> Harness {
        let snapshot = Arc::new(MemorySnapshotStore::new());
        Harness {
            store: Arc::new(MemoryStore::new()),
            cache: Arc::new(OrderCache::new(capacity, snapshot.clone()).unwrap()),
            snapshot,
        }
    }

    fn use_case(h: &Harness) -> IngestOrderUseCase {
        IngestOrderUseCase::new(h.store.clone(), h.cache.clone(), OrderValidator::new())
    }

    #[tokio::test]
    async fn test_ingest_stores_then_admits() {
        let h = harness(3);
        let admission = use_case(&h).ingest(sample_order("o1")).await.unwrap();

        assert_eq!(admission.kind, AdmissionKind::Inserted);
        assert!(h.store.get_by_key("o1").await.unwrap().is_some());
        assert!(h.cache.contains("o1"));
        assert_eq!(h.snapshot.keys(), Some(vec!["o1".to_string()]));
    }

    #[tokio::test]
    async fn test_invalid_order_touches_nothing() {
        let h = harness(3);
        let mut order = sample_order("o1");
        order.delivery.city.clear();

        let err = use_case(&h).ingest(order).await.unwrap_err();
        assert_eq!(err.kind(), RejectKind::Validation);
        assert!(h.store.is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_rejected_by_default() {
        let h = harness(3);
        let use_case = use_case(&h);
        use_case.ingest(sample_order("o1")).await.unwrap();

        let mut again = sample_order("o1");
        again.entry = "OTHER".to_string();
        let err = use_case.ingest(again).await.unwrap_err();

        assert!(matches!(err, IngestError::Conflict(ref key) if key == "o1"));
        assert_eq!(h.store.get_by_key("o1").await.unwrap().unwrap().entry, "WBIL");
        assert_eq!(h.cache.get("o1").unwrap().entry, "WBIL");
    }

    #[tokio::test]
    async fn test_upsert_policy_replaces() {
        let h = harness(3);
        let use_case = use_case(&h).with_policy(ConflictPolicy::Upsert);
        use_case.ingest(sample_order("o1")).await.unwrap();

        let mut again = sample_order("o1");
        again.entry = "OTHER".to_string();
        let admission = use_case.ingest(again).await.unwrap();

        assert_eq!(admission.kind, AdmissionKind::Replaced);
        assert_eq!(h.store.get_by_key("o1").await.unwrap().unwrap().entry, "OTHER");
        assert_eq!(h.cache.get("o1").unwrap().entry, "OTHER");
    }

    #[tokio::test]
    async fn test_store_failure_skips_admission() {
        let h = harness(3);
        h.store.fail_writes(true);

        let err = use_case(&h).ingest(sample_order("o1")).await.unwrap_err();
        assert_eq!(err.kind(), RejectKind::Io);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_still_succeeds() {
        let h = harness(3);
        h.snapshot.fail_writes(true);

        let admission = use_case(&h).ingest(sample_order("o1")).await.unwrap();
        assert!(admission.snapshot.is_err());
        assert!(h.cache.contains("o1"));
        assert!(h.store.get_by_key("o1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_decode_error() {
        let h = harness(3);
        let err = use_case(&h).execute(b"{not json").await.unwrap_err();
        assert_eq!(err.kind(), RejectKind::Decode);
    }
}
