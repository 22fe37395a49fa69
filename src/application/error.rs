/// Application errors - one failure per inbound message
///
/// Every variant maps onto a wire-level category (`RejectKind` for
/// ingestion, `LookupErrorKind` for lookups) so the run-loops can report
/// it through the same channel used for successes.

use crate::domain::ports::StoreError;
use crate::domain::validation::ValidationError;
use crate::shared::protocol::{LookupErrorKind, ProtocolError, RejectKind};
use std::time::Duration;

/// Why an inbound order was not ingested
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed order payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("order '{0}' already exists")]
    Conflict(String),

    #[error("{0}")]
    Io(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl IngestError {
    pub fn kind(&self) -> RejectKind {
        match self {
            IngestError::Decode(_) => RejectKind::Decode,
            IngestError::Validation(_) => RejectKind::Validation,
            IngestError::Conflict(_) => RejectKind::Conflict,
            IngestError::Io(_) | IngestError::Timeout(_) => RejectKind::Io,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => IngestError::Conflict(key),
            other => IngestError::Io(other.to_string()),
        }
    }
}

/// Why a lookup could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("invalid lookup request: {0}")]
    Request(#[from] ProtocolError),

    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl LookupError {
    pub fn kind(&self) -> LookupErrorKind {
        match self {
            LookupError::Request(_) => LookupErrorKind::Request,
            LookupError::Store(_) | LookupError::Timeout(_) => LookupErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_kinds() {
        let conflict: IngestError = StoreError::Conflict("o1".to_string()).into();
        assert_eq!(conflict.kind(), RejectKind::Conflict);
        assert_eq!(conflict.to_string(), "order 'o1' already exists");

        let io: IngestError = StoreError::Io("connection reset".to_string()).into();
        assert_eq!(io.kind(), RejectKind::Io);

        let corrupt: IngestError = StoreError::Corrupt("bad row".to_string()).into();
        assert_eq!(corrupt.kind(), RejectKind::Io);
    }

    #[test]
    fn test_lookup_error_kinds() {
        assert_eq!(
            LookupError::Request(ProtocolError::Empty).kind(),
            LookupErrorKind::Request
        );
        assert_eq!(
            LookupError::Timeout(Duration::from_secs(5)).kind(),
            LookupErrorKind::Io
        );
    }
}
