/// Shared utilities and types used across all layers
///
/// This module contains:
/// - Wire payloads exchanged on the transport (protocol)
/// - Prometheus metrics registry
/// - Collections backing the cache (slot liveness bitmap)
/// - Sample orders for tests, benchmarks and the load generator

pub mod collections;
pub mod fixtures;
pub mod metrics;
pub mod protocol;

// Re-export commonly used types
pub use protocol::{
    IngestReport, LookupErrorKind, LookupRequest, LookupResponse, ProtocolError, RejectKind,
    ResolvedFrom,
};
