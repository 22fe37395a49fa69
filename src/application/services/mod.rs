/// Application Services - the two run-loops
///
/// ## Available Services
/// - `IngestionService`: full orders in, ingestion reports out
/// - `LookupService`: identifiers in, lookup responses out
///
/// Each loop processes one message at a time in arrival order, stops
/// taking new messages when its `CancellationToken` fires, and returns the
/// counters it accumulated.

pub mod ingestion_service;
pub mod lookup_service;

pub use ingestion_service::IngestionService;
pub use lookup_service::LookupService;

use crate::infrastructure::transport::{Transport, TransportError};
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Back-off after a failed receive
pub(crate) const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long an outbound send may still wait once shutdown has fired
pub(crate) const SHUTDOWN_SEND_GRACE: Duration = Duration::from_millis(500);

/// Sends `payload`, giving up `SHUTDOWN_SEND_GRACE` after `shutdown` fires
///
/// Outbound lanes stop draining during shutdown, so a send to a full lane
/// would otherwise never return.
pub(crate) async fn send_until_shutdown(
    transport: &dyn Transport,
    channel: &str,
    payload: Bytes,
    shutdown: &CancellationToken,
) -> Result<(), TransportError> {
    let grace_expired = async {
        shutdown.cancelled().await;
        tokio::time::sleep(SHUTDOWN_SEND_GRACE).await;
    };

    tokio::select! {
        biased;
        result = transport.send(channel, payload) => result,
        _ = grace_expired => Err(TransportError::Full(channel.to_string())),
    }
}

/// Counters returned by a run-loop when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Inbound messages taken from the transport
    pub received: u64,
    /// Messages that resolved successfully (accepted / found / not found)
    pub succeeded: u64,
    /// Messages that failed (rejected / error response)
    pub failed: u64,
    /// Outbound messages delivered to the transport
    pub responses_sent: u64,
}
