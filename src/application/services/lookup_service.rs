/// Lookup Service - the lookup run-loop
///
/// Pulls identifier requests from the inbound channel, resolves each via
/// `LookupOrderUseCase::respond` and publishes exactly one
/// `LookupResponse` per request on the response channel.

use super::{send_until_shutdown, ServiceStats, RECEIVE_RETRY_DELAY};
use crate::application::use_cases::LookupOrderUseCase;
use crate::infrastructure::transport::{Message, Transport};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::LookupResponse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lookup run-loop
pub struct LookupService {
    transport: Arc<dyn Transport>,
    use_case: LookupOrderUseCase,
    inbound: String,
    response_channel: String,
    stats: ServiceStats,
}

impl LookupService {
    pub fn new(
        transport: Arc<dyn Transport>,
        use_case: LookupOrderUseCase,
        inbound: impl Into<String>,
        response_channel: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            use_case,
            inbound: inbound.into(),
            response_channel: response_channel.into(),
            stats: ServiceStats::default(),
        }
    }

    /// Runs until `shutdown` fires or the transport closes
    pub async fn run(mut self, shutdown: CancellationToken) -> ServiceStats {
        info!(
            channel = %self.inbound,
            responses = %self.response_channel,
            "lookup service started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.transport.receive(&self.inbound) => received,
            };

            match received {
                Ok(Some(message)) => self.process(message, &shutdown).await,
                Ok(None) => {
                    info!(channel = %self.inbound, "inbound channel closed");
                    break;
                }
                Err(e) => {
                    METRICS
                        .transport_errors
                        .with_label_values(&[self.inbound.as_str(), "receive"])
                        .inc();
                    warn!(channel = %self.inbound, error = %e, "receive failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!(
            received = self.stats.received,
            resolved = self.stats.succeeded,
            failed = self.stats.failed,
            "lookup service stopped"
        );
        self.stats
    }

    async fn process(&mut self, message: Message, shutdown: &CancellationToken) {
        self.stats.received += 1;

        let response = self.use_case.respond(&message.payload).await;
        if response.is_error() {
            self.stats.failed += 1;
        } else {
            self.stats.succeeded += 1;
        }

        self.publish(&response, shutdown).await;
    }

    async fn publish(&mut self, response: &LookupResponse, shutdown: &CancellationToken) {
        let payload = match response.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(order_uid = ?response.order_uid(), error = %e, "failed to encode lookup response");
                return;
            }
        };

        match send_until_shutdown(self.transport.as_ref(), &self.response_channel, payload, shutdown).await {
            Ok(()) => {
                self.stats.responses_sent += 1;
                debug!(order_uid = ?response.order_uid(), "lookup response sent");
            }
            Err(e) => {
                METRICS
                    .transport_errors
                    .with_label_values(&[self.response_channel.as_str(), "send"])
                    .inc();
                warn!(
                    order_uid = ?response.order_uid(),
                    error = %e,
                    "failed to send lookup response"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::OrderCache;
    use crate::domain::ports::OrderStore;
    use crate::infrastructure::storage::{MemorySnapshotStore, MemoryStore};
    use crate::infrastructure::transport::ChannelTransport;
    use crate::shared::fixtures::sample_order;
    use crate::shared::protocol::ResolvedFrom;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_one_response_per_request() {
        let transport = Arc::new(ChannelTransport::new(32));
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(OrderCache::new(2, Arc::new(MemorySnapshotStore::new())).unwrap());

        store.insert(&sample_order("stored")).await.unwrap();
        cache.admit("cached", Arc::new(sample_order("cached"))).await;

        let use_case = LookupOrderUseCase::new(store, cache);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            LookupService::new(transport.clone(), use_case, "order_id", "order_response").run(shutdown.clone()),
        );

        let requests = ["cached", "stored", "ghost", "", r#"{"order_uid":"stored"}"#];
        for request in requests {
            transport.send("order_id", Bytes::from(request)).await.unwrap();
        }

        let mut responses = Vec::new();
        for _ in 0..requests.len() {
            let message = transport.receive("order_response").await.unwrap().unwrap();
            responses.push(LookupResponse::from_slice(&message.payload).unwrap());
        }

        assert!(matches!(
            &responses[0],
            LookupResponse::Found { source: ResolvedFrom::Cache, order_uid, .. } if order_uid == "cached"
        ));
        assert!(matches!(
            &responses[1],
            LookupResponse::Found { source: ResolvedFrom::Store, order_uid, .. } if order_uid == "stored"
        ));
        assert_eq!(
            responses[2],
            LookupResponse::NotFound {
                order_uid: "ghost".to_string()
            }
        );
        assert!(responses[3].is_error());
        assert!(matches!(&responses[4], LookupResponse::Found { .. }));

        shutdown.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.responses_sent, 5);
    }

    #[tokio::test]
    async fn test_stops_on_cancel_while_idle() {
        let transport = Arc::new(ChannelTransport::new(4));
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(OrderCache::new(2, Arc::new(MemorySnapshotStore::new())).unwrap());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            LookupService::new(
                transport,
                LookupOrderUseCase::new(store, cache),
                "order_id",
                "order_response",
            )
            .run(shutdown.clone()),
        );

        shutdown.cancel();
        let stats = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, ServiceStats::default());
    }

    #[tokio::test]
    async fn test_cancel_with_full_response_lane_returns() {
        let transport = Arc::new(ChannelTransport::new(1));
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(OrderCache::new(2, Arc::new(MemorySnapshotStore::new())).unwrap());

        // 响应通道已满且无人消费
        transport.send("order_response", Bytes::from("backlog")).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            LookupService::new(
                transport.clone(),
                LookupOrderUseCase::new(store, cache),
                "order_id",
                "order_response",
            )
            .run(shutdown.clone()),
        );

        transport.send("order_id", Bytes::from("ghost")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.cancel();

        let stats = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("lookup loop returns after shutdown")
            .unwrap();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.responses_sent, 0);
    }
}
