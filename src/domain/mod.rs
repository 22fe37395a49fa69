/// Domain Layer - Core Business Logic
///
/// This is the heart of the order lookup service: the order record, its
/// validation rules and the bounded eviction cache. Collaborators (durable
/// store, snapshot store) are reached only through the traits in `ports`.
///
/// ## Modules
/// - `order`: Order record and its sub-entities
/// - `validation`: Order validation rules
/// - `cache`: Bounded FIFO eviction cache with snapshot/restore
/// - `ports`: Store and snapshot interfaces
///
/// ## Principles
/// 1. **No direct I/O**: storage and files sit behind `ports`
/// 2. **Testable**: Every rule can be exercised with in-memory doubles
/// 3. **Allocation-light reads**: cache hits hand out an `Arc`

pub mod cache;
pub mod order;
pub mod ports;
pub mod validation;

// Re-export key types
pub use cache::{Admission, AdmissionKind, CacheError, CacheStats, OrderCache};
pub use order::{Delivery, Item, Order, Payment};
pub use ports::{OrderStore, SnapshotError, SnapshotStore, StoreError};
pub use validation::{OrderValidator, ValidationConfig, ValidationError};
