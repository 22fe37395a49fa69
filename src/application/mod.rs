/// Application Layer - Use Cases and Services
///
/// This layer orchestrates domain logic into the two paths of the service.
/// It depends on the domain layer and reaches infrastructure only through
/// the `OrderStore`, `SnapshotStore` and `Transport` traits.
///
/// ## Modules
/// - `use_cases`: Ingest and lookup operations for a single message
/// - `services`: Run-loops driving the use cases from the transport
/// - `error`: Per-message failure types

pub mod error;
pub mod services;
pub mod use_cases;

// Re-export key types
pub use error::{IngestError, LookupError};
pub use services::{IngestionService, LookupService, ServiceStats};
pub use use_cases::{ConflictPolicy, IngestOrderUseCase, LookupOrderUseCase, LookupOutcome};
