//! 存储层
//!
//! 实现 `domain::ports` 中的两个端口：
//! - `OrderStore`: `PgStore`（生产）/ `MemoryStore`（本地运行和测试）
//! - `SnapshotStore`: `FileSnapshotStore`（生产）/ `MemorySnapshotStore`（测试）

pub mod memory;
pub mod postgres;
pub mod snapshot;

pub use memory::{MemorySnapshotStore, MemoryStore};
pub use postgres::{PgStore, PgStoreConfig};
pub use snapshot::FileSnapshotStore;
