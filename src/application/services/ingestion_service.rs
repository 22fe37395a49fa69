/// Ingestion Service - the ingestion run-loop
///
/// Pulls full orders from the inbound channel and runs each through
/// `IngestOrderUseCase`, strictly one at a time so store-write order and
/// cache admission order match arrival order.
///
/// Every message yields one `IngestReport` on the report channel (when one
/// is configured). A failed message never stops the loop.
///
/// ## Usage
/// ```rust,ignore
/// let service = IngestionService::new(transport, use_case, "json_data")
///     .with_report_channel("order_ingest_result");
/// let stats = service.run(shutdown.clone()).await;
/// ```

use super::{send_until_shutdown, ServiceStats, RECEIVE_RETRY_DELAY};
use crate::application::use_cases::IngestOrderUseCase;
use crate::infrastructure::transport::{Message, Transport};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::IngestReport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ingestion run-loop
pub struct IngestionService {
    transport: Arc<dyn Transport>,
    use_case: IngestOrderUseCase,
    inbound: String,
    report_channel: Option<String>,
    stats: ServiceStats,
}

impl IngestionService {
    pub fn new(transport: Arc<dyn Transport>, use_case: IngestOrderUseCase, inbound: impl Into<String>) -> Self {
        Self {
            transport,
            use_case,
            inbound: inbound.into(),
            report_channel: None,
            stats: ServiceStats::default(),
        }
    }

    /// Publishes an `IngestReport` per message on `channel`
    pub fn with_report_channel(mut self, channel: impl Into<String>) -> Self {
        self.report_channel = Some(channel.into());
        self
    }

    /// Runs until `shutdown` fires or the transport closes
    pub async fn run(mut self, shutdown: CancellationToken) -> ServiceStats {
        info!(channel = %self.inbound, policy = ?self.use_case.policy(), "ingestion service started");

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
            accepted = self.stats.succeeded,
            rejected = self.stats.failed,
            "ingestion service stopped"
        );
        self.stats
    }

    async fn process(&mut self, message: Message, shutdown: &CancellationToken) {
        self.stats.received += 1;

        let report = match self.use_case.decode(&message.payload) {
            Err(e) => {
                warn!(offset = message.offset, error = %e, "undecodable order dropped");
                IngestReport::Rejected {
                    order_uid: None,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
            Ok(order) => {
                let order_uid = order.order_uid.clone();
                match self.use_case.ingest(order).await {
                    Ok(admission) => {
                        info!(order_uid = %order_uid, evicted = ?admission.evicted, "order ingested");
                        IngestReport::Accepted {
                            order_uid,
                            evicted: admission.evicted,
                        }
                    }
                    Err(e) => {
                        warn!(order_uid = %order_uid, error = %e, "order rejected");
                        IngestReport::Rejected {
                            order_uid: Some(order_uid),
                            kind: e.kind(),
                            message: e.to_string(),
                        }
                    }
                }
            }
        };

        match &report {
            IngestReport::Accepted { .. } => {
                self.stats.succeeded += 1;
                METRICS.ingest_total.with_label_values(&["accepted"]).inc();
            }
            IngestReport::Rejected { kind, .. } => {
                self.stats.failed += 1;
                METRICS.ingest_total.with_label_values(&[kind.as_str()]).inc();
            }
        }

        self.publish(&report, shutdown).await;
    }

    async fn publish(&mut self, report: &IngestReport, shutdown: &CancellationToken) {
        let Some(channel) = &self.report_channel else {
            return;
        };

        let payload = match report.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode ingest report");
                return;
            }
        };

        match send_until_shutdown(self.transport.as_ref(), channel, payload, shutdown).await {
            Ok(()) => {
                self.stats.responses_sent += 1;
                debug!(channel = %channel, "ingest report sent");
            }
            Err(e) => {
                METRICS
                    .transport_errors
                    .with_label_values(&[channel.as_str(), "send"])
                    .inc();
                warn!(channel = %channel, error = %e, "failed to send ingest report");
            }
        }
    }
}
