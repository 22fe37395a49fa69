/// Infrastructure Layer - Technical Implementations
///
/// This layer contains the implementations that talk to the outside world:
/// the durable store, the snapshot file, the message transport and the
/// HTTP observability endpoints.
///
/// The infrastructure layer depends on the domain layer but the domain
/// layer does not depend on infrastructure (dependency inversion through
/// `domain::ports`).
///
/// ## Modules
/// - `storage`: `OrderStore` / `SnapshotStore` implementations
/// - `transport`: Channel transport and TCP gateway
/// - `observability`: Metrics, health and cache endpoints

pub mod observability;
pub mod storage;
pub mod transport;

// Re-export key types
pub use storage::{FileSnapshotStore, MemorySnapshotStore, MemoryStore, PgStore, PgStoreConfig};
pub use transport::{ChannelTransport, Gateway, GatewayConfig, Message, Transport, TransportError};
