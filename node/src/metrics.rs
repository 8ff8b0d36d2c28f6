//! # Prometheus Metrics
//!
//! Operational metrics for the vault host, scraped at `/metrics` on the
//! metrics port. Everything is registered in a dedicated
//! [`prometheus::Registry`] with the `quorum` prefix.
//!
//! `operations_total{operation}` counts operations the vault accepted and
//! the store committed; `rejections_total{kind}` counts what the vault
//! refused. A call that fails to commit shows up only in
//! `persistence_failures_total`. The gauges mirror vault state after each
//! committed mutation.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use quorum_contracts::{Operation, Vault, VaultError};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Accepted vault operations, by operation.
    pub operations_total: IntCounterVec,
    /// Rejected vault operations, by error kind.
    pub rejections_total: IntCounterVec,
    /// Current vault balance. Saturates at `i64::MAX`.
    pub vault_balance: IntGauge,
    /// Transactions proposed so far (executed or not).
    pub transactions_proposed: IntGauge,
    /// Transactions executed since this process started.
    pub transactions_executed_total: IntCounter,
    /// Commits to the store that failed after the vault accepted a call.
    pub persistence_failures_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("quorum".into()), None)
            .expect("failed to create prometheus registry");

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Vault operations accepted, by operation"),
            &["operation"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_total.clone()))
            .expect("metric registration");

        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Vault operations rejected, by error kind"),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("metric registration");

        let vault_balance = IntGauge::new("vault_balance", "Current vault balance")
            .expect("metric creation");
        registry
            .register(Box::new(vault_balance.clone()))
            .expect("metric registration");

        let transactions_proposed = IntGauge::new(
            "transactions_proposed",
            "Number of transactions proposed against the vault",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_proposed.clone()))
            .expect("metric registration");

        let transactions_executed_total = IntCounter::new(
            "transactions_executed_total",
            "Transactions executed since process start",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_executed_total.clone()))
            .expect("metric registration");

        let persistence_failures_total = IntCounter::new(
            "persistence_failures_total",
            "Failed commits of accepted vault state to the store",
        )
        .expect("metric creation");
        registry
            .register(Box::new(persistence_failures_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            operations_total,
            rejections_total,
            vault_balance,
            transactions_proposed,
            transactions_executed_total,
            persistence_failures_total,
        }
    }

    /// Records an accepted operation and refreshes the vault gauges.
    pub fn record_accepted(&self, operation: Operation, vault: &Vault) {
        self.operations_total
            .with_label_values(&[operation.as_str()])
            .inc();
        if operation == Operation::Execute {
            self.transactions_executed_total.inc();
        }
        self.observe_vault(vault);
    }

    /// Records a rejected operation.
    pub fn record_rejected(&self, error: &VaultError) {
        self.rejections_total
            .with_label_values(&[error.kind()])
            .inc();
    }

    /// Sets the gauges from the vault's current state.
    pub fn observe_vault(&self, vault: &Vault) {
        self.vault_balance
            .set(i64::try_from(vault.balance()).unwrap_or(i64::MAX));
        self.transactions_proposed
            .set(i64::try_from(vault.transaction_count()).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
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
    use quorum_protocol::Address;

    #[test]
    fn accepted_and_rejected_are_counted() {
        let metrics = NodeMetrics::new();
        let owner = Address::from_bytes([1; 32]);
        let mut vault = Vault::create(vec![owner], 1).unwrap();
        vault.deposit(&owner, 42).unwrap();

        metrics.record_accepted(Operation::Deposit, &vault);
        metrics.record_rejected(&VaultError::AlreadyExecuted { index: 0 });

        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["deposit"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .rejections_total
                .with_label_values(&["already_executed"])
                .get(),
            1
        );
        assert_eq!(metrics.vault_balance.get(), 42);
    }

    #[test]
    fn huge_balance_saturates_gauge() {
        let metrics = NodeMetrics::new();
        let owner = Address::from_bytes([1; 32]);
        let mut vault = Vault::create(vec![owner], 1).unwrap();
        vault.deposit(&owner, u64::MAX).unwrap();
        metrics.observe_vault(&vault);
        assert_eq!(metrics.vault_balance.get(), i64::MAX);
    }

    #[test]
    fn encoded_output_is_prefixed() {
        let metrics = NodeMetrics::new();
        metrics.transactions_executed_total.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("quorum_transactions_executed_total 1"));
    }
}
