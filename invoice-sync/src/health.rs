// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Indexer health: how far each chain's indexer trails the chain head.

use crate::chain::ChainReader;
use crate::error::ServiceError;
use crate::indexer::IndexerClient;
use crate::metrics::SyncMetrics;
use invoice_types::ChainId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Largest acceptable distance between the chain head and the indexer
pub const DEFAULT_MAX_LAG: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerHealth {
    pub chain: ChainId,
    pub synced_block: u64,
    pub latest_block: u64,
    pub lag: u64,
    pub has_indexing_errors: bool,
    pub healthy: bool,
}

/// One check of `chain`: unhealthy when the indexer reports indexing errors
/// or trails the chain head by more than `max_lag` blocks.
pub async fn check_health(
    indexer: &dyn IndexerClient,
    chain_reader: &dyn ChainReader,
    chain: ChainId,
    max_lag: u64,
) -> Result<IndexerHealth, ServiceError> {
    let (status, latest_block) = tokio::join!(
        indexer.sync_status(chain),
        chain_reader.latest_block_number(chain)
    );
    let status = status?;
    let latest_block = latest_block?;
    let lag = latest_block.saturating_sub(status.synced_block_number);
    Ok(IndexerHealth {
        chain,
        synced_block: status.synced_block_number,
        latest_block,
        lag,
        has_indexing_errors: status.has_indexing_errors,
        healthy: !status.has_indexing_errors && lag <= max_lag,
    })
}

/// Latest health of every chain; a failed check counts as unhealthy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub chains: BTreeMap<ChainId, Result<IndexerHealth, ServiceError>>,
}

impl HealthReport {
    pub fn is_healthy(&self, chain: ChainId) -> bool {
        matches!(self.chains.get(&chain), Some(Ok(health)) if health.healthy)
    }

    /// True when any chain is unhealthy or could not be checked. Reads keep
    /// being served, but callers may flag them as possibly stale.
    pub fn is_degraded(&self) -> bool {
        self.chains.keys().any(|chain| !self.is_healthy(*chain))
    }
}

pub struct HealthMonitor {
    indexer: Arc<dyn IndexerClient>,
    chain_reader: Arc<dyn ChainReader>,
    chains: Vec<ChainId>,
    max_lag: u64,
    check_interval: Duration,
    metrics: Arc<SyncMetrics>,
    report_tx: watch::Sender<HealthReport>,
}

impl HealthMonitor {
    pub fn new(
        indexer: Arc<dyn IndexerClient>,
        chain_reader: Arc<dyn ChainReader>,
        chains: Vec<ChainId>,
        max_lag: u64,
        check_interval: Duration,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (report_tx, _) = watch::channel(HealthReport::default());
        Self {
            indexer,
            chain_reader,
            chains,
            max_lag,
            check_interval,
            metrics,
            report_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthReport> {
        self.report_tx.subscribe()
    }

    pub fn latest(&self) -> HealthReport {
        self.report_tx.borrow().clone()
    }

    /// Run checks every `check_interval` until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[Health] Started for {} chains with interval: {:?}",
            self.chains.len(),
            self.check_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Health] Cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.check_all().await;
                }
            }
        }
    }

    /// Check every chain once and publish the report
    pub async fn check_all(&self) -> HealthReport {
        let checks = self.chains.iter().map(|chain| async move {
            let result = check_health(
                self.indexer.as_ref(),
                self.chain_reader.as_ref(),
                *chain,
                self.max_lag,
            )
            .await;
            (*chain, result)
        });
        let results = futures::future::join_all(checks).await;

        let previous = self.latest();
        let mut report = HealthReport::default();
        for (chain, result) in results {
            self.record(chain, &result);
            let was_healthy = previous.is_healthy(chain);
            let first_or_was_healthy = was_healthy || !previous.chains.contains_key(&chain);
            match &result {
                Ok(health) if health.healthy && !was_healthy => {
                    info!(
                        "[Health] Indexer for chain {} healthy (block {}, lag {})",
                        chain, health.synced_block, health.lag
                    );
                }
                Ok(health) if !health.healthy && first_or_was_healthy => {
                    warn!(
                        "[Health] Indexer for chain {} unhealthy: lag {} blocks, indexing errors: {}",
                        chain, health.lag, health.has_indexing_errors
                    );
                }
                Err(e) => {
                    error!("[Health] Health check failed for chain {}: {}", chain, e);
                }
                _ => {}
            }
            report.chains.insert(chain, result);
        }

        self.report_tx.send_replace(report.clone());
        report
    }

    fn record(&self, chain: ChainId, result: &Result<IndexerHealth, ServiceError>) {
        let label = chain.to_string();
        match result {
            Ok(health) => {
                self.metrics
                    .indexer_synced_block
                    .with_label_values(&[&label])
                    .set(health.synced_block as i64);
                self.metrics
                    .indexer_lag_blocks
                    .with_label_values(&[&label])
                    .set(health.lag as i64);
                self.metrics
                    .indexer_healthy
                    .with_label_values(&[&label])
                    .set(health.healthy as i64);
            }
            Err(_) => {
                self.metrics
                    .indexer_healthy
                    .with_label_values(&[&label])
                    .set(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChainReadError, IndexerError};
    use crate::test_utils::{MockChainReader, MockIndexerClient};

    fn monitor(
        indexer: &MockIndexerClient,
        reader: &MockChainReader,
        chains: &[ChainId],
    ) -> (Arc<HealthMonitor>, Arc<SyncMetrics>) {
        let metrics = Arc::new(SyncMetrics::new_for_testing());
        let monitor = HealthMonitor::new(
            Arc::new(indexer.clone()),
            Arc::new(reader.clone()),
            chains.to_vec(),
            DEFAULT_MAX_LAG,
            Duration::from_secs(30),
            metrics.clone(),
        );
        (Arc::new(monitor), metrics)
    }

    #[tokio::test]
    async fn test_lag_threshold() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        reader.set_latest_block(ChainId::MAINNET, 1_000);

        indexer.set_sync_status(ChainId::MAINNET, 968, false);
        let health = check_health(&indexer, &reader, ChainId::MAINNET, 32)
            .await
            .unwrap();
        assert_eq!(health.lag, 32);
        assert!(health.healthy);

        indexer.set_sync_status(ChainId::MAINNET, 967, false);
        let health = check_health(&indexer, &reader, ChainId::MAINNET, 32)
            .await
            .unwrap();
        assert_eq!(health.lag, 33);
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn test_indexing_errors_are_unhealthy() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        reader.set_latest_block(ChainId::GNOSIS, 500);
        indexer.set_sync_status(ChainId::GNOSIS, 500, true);

        let health = check_health(&indexer, &reader, ChainId::GNOSIS, 32)
            .await
            .unwrap();
        assert_eq!(health.lag, 0);
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn test_indexer_ahead_of_rpc_has_zero_lag() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        reader.set_latest_block(ChainId::POLYGON, 100);
        indexer.set_sync_status(ChainId::POLYGON, 105, false);

        let health = check_health(&indexer, &reader, ChainId::POLYGON, 32)
            .await
            .unwrap();
        assert_eq!(health.lag, 0);
        assert!(health.healthy);
    }

    #[tokio::test]
    async fn test_check_errors_surface() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        indexer.set_sync_status_error(
            ChainId::MAINNET,
            IndexerError::Http {
                status: 502,
                body: String::new(),
            },
        );
        reader.set_latest_block(ChainId::MAINNET, 10);
        let err = check_health(&indexer, &reader, ChainId::MAINNET, 32)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "http");

        indexer.set_sync_status(ChainId::ARBITRUM, 10, false);
        let err = check_health(&indexer, &reader, ChainId::ARBITRUM, 32)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::ChainRead(ChainReadError::UnknownChain(ChainId::ARBITRUM))
        );
    }

    #[tokio::test]
    async fn test_report_publishes_degraded_state() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        reader.set_latest_block(ChainId::MAINNET, 1_000);
        reader.set_latest_block(ChainId::GNOSIS, 1_000);
        indexer.set_sync_status(ChainId::MAINNET, 1_000, false);
        indexer.set_sync_status(ChainId::GNOSIS, 900, false);

        let (monitor, metrics) = monitor(&indexer, &reader, &[ChainId::MAINNET, ChainId::GNOSIS]);
        let mut rx = monitor.subscribe();

        let report = monitor.check_all().await;
        assert!(report.is_healthy(ChainId::MAINNET));
        assert!(!report.is_healthy(ChainId::GNOSIS));
        assert!(report.is_degraded());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), report);
        assert_eq!(
            metrics.indexer_lag_blocks.with_label_values(&["100"]).get(),
            100
        );
        assert_eq!(metrics.indexer_healthy.with_label_values(&["1"]).get(), 1);

        indexer.set_sync_status(ChainId::GNOSIS, 1_000, false);
        let report = monitor.check_all().await;
        assert!(!report.is_degraded());
        assert!(!monitor.latest().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        reader.set_latest_block(ChainId::MAINNET, 10);
        indexer.set_sync_status(ChainId::MAINNET, 10, false);
        let (monitor, _) = monitor(&indexer, &reader, &[ChainId::MAINNET]);
        let mut rx = monitor.subscribe();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.clone().run(cancel.clone()));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_healthy(ChainId::MAINNET));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
