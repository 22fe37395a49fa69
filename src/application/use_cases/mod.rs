/// Use Cases - one operation per inbound message
///
/// ## Available Use Cases
/// - `IngestOrderUseCase`: decode, validate, store and admit an order
/// - `LookupOrderUseCase`: resolve an identifier via cache then store

pub mod ingest_order;
pub mod lookup_order;

// Re-export key types
pub use ingest_order::{ConflictPolicy, IngestOrderUseCase, DEFAULT_OP_TIMEOUT};
pub use lookup_order::{LookupOrderUseCase, LookupOutcome};
