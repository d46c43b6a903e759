//! # Prometheus Metrics
//!
//! Operational metrics for the settlement server, scraped at `/metrics` on
//! the metrics port. Registered in a dedicated [`prometheus::Registry`]
//! under the `offcoin` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use offcoin_protocol::settlement::ReconcileSummary;

/// All metric handles for the server. Cheap to clone.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Orders created, labelled by payment mode.
    pub orders_created_total: IntCounterVec,
    /// Coin tokens minted for payers.
    pub tokens_minted_total: IntCounter,
    /// Reconciled records, labelled by outcome.
    pub records_reconciled_total: IntCounterVec,
    /// Reconciliation batches rejected before touching the store.
    pub batches_rejected_total: IntCounter,
    /// Pending Offline orders in the last feed served.
    pub pending_offline_orders: IntGauge,
    /// Wall time to reconcile one batch.
    pub reconcile_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Create and register every metric. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("offcoin".into()), None)?;

        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created, by payment mode"),
            &["payment_mode"],
        )?;
        registry.register(Box::new(orders_created_total.clone()))?;

        let tokens_minted_total =
            IntCounter::new("tokens_minted_total", "Coin tokens minted for payers")?;
        registry.register(Box::new(tokens_minted_total.clone()))?;

        let records_reconciled_total = IntCounterVec::new(
            Opts::new(
                "records_reconciled_total",
                "Redemption records reconciled, by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(records_reconciled_total.clone()))?;

        let batches_rejected_total = IntCounter::new(
            "batches_rejected_total",
            "Reconciliation batches rejected by validation",
        )?;
        registry.register(Box::new(batches_rejected_total.clone()))?;

        let pending_offline_orders = IntGauge::new(
            "pending_offline_orders",
            "Pending offline orders in the most recent agent feed",
        )?;
        registry.register(Box::new(pending_offline_orders.clone()))?;

        let reconcile_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "reconcile_latency_seconds",
                "Time to reconcile one redemption batch in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(reconcile_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            orders_created_total,
            tokens_minted_total,
            records_reconciled_total,
            batches_rejected_total,
            pending_offline_orders,
            reconcile_latency_seconds,
        })
    }

    /// Fold a batch summary into the outcome counters.
    pub fn record_summary(&self, summary: &ReconcileSummary) {
        let counts = [
            ("settled", summary.settled),
            ("already_settled", summary.already_settled),
            ("conflict", summary.conflicts),
        ];
        for (outcome, count) in counts {
            self.records_reconciled_total
                .with_label_values(&[outcome])
                .inc_by(count as u64);
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offcoin_protocol::order::RedemptionRecord;
    use offcoin_protocol::settlement::{RecordOutcome, RecordReport};

    #[test]
    fn metrics_register_and_encode() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.tokens_minted_total.inc();
        metrics
            .orders_created_total
            .with_label_values(&["Offline"])
            .inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("offcoin_tokens_minted_total 1"));
        assert!(text.contains("offcoin_orders_created_total{payment_mode=\"Offline\"} 1"));
    }

    #[test]
    fn summary_feeds_outcome_counters() {
        let metrics = NodeMetrics::new().unwrap();
        let record = RedemptionRecord {
            order_id: "ORD-1".into(),
            user_id: "U-1".into(),
            assigned_agent_id: "A-1".into(),
            coin_id: "CN-1".into(),
        };
        let summary = ReconcileSummary {
            reports: vec![RecordReport {
                record,
                outcome: RecordOutcome::Settled,
            }],
            settled: 1,
            already_settled: 2,
            conflicts: 0,
        };
        metrics.record_summary(&summary);

        let settled = metrics
            .records_reconciled_total
            .with_label_values(&["settled"])
            .get();
        let already = metrics
            .records_reconciled_total
            .with_label_values(&["already_settled"])
            .get();
        assert_eq!((settled, already), (1, 2));
    }
}
