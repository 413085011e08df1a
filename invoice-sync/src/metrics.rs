// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, HistogramVec, IntCounterVec, IntGaugeVec, Registry,
};

const LATENCY_SEC_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 7.5, 10., 15., 20.,
    30., 60.,
];

#[derive(Clone, Debug)]
pub struct SyncMetrics {
    pub(crate) indexer_queries: IntCounterVec,
    pub(crate) indexer_query_errors: IntCounterVec,
    pub(crate) indexer_queries_latency: HistogramVec,
    pub(crate) indexer_failovers: IntCounterVec,

    pub(crate) chain_reads: IntCounterVec,
    pub(crate) chain_read_errors: IntCounterVec,

    pub(crate) poll_outcomes: IntCounterVec,
    pub(crate) poll_attempts: IntCounterVec,

    pub(crate) cache_hits: IntCounterVec,
    pub(crate) cache_misses: IntCounterVec,
    pub(crate) cache_stale_served: IntCounterVec,
    pub(crate) cache_invalidations: IntCounterVec,

    pub(crate) aggregator_chain_errors: IntCounterVec,

    pub(crate) indexer_synced_block: IntGaugeVec,
    pub(crate) indexer_lag_blocks: IntGaugeVec,
    pub(crate) indexer_healthy: IntGaugeVec,

    pub(crate) reducer_rejections: IntCounterVec,
}

impl SyncMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            indexer_queries: register_int_counter_vec_with_registry!(
                "invoice_sync_indexer_queries",
                "Total number of queries issued to the indexer, by chain and operation",
                &["chain", "op"],
                registry,
            )
            .unwrap(),
            indexer_query_errors: register_int_counter_vec_with_registry!(
                "invoice_sync_indexer_query_errors",
                "Total number of failed indexer queries, by chain, operation and error type",
                &["chain", "op", "error"],
                registry,
            )
            .unwrap(),
            indexer_queries_latency: register_histogram_vec_with_registry!(
                "invoice_sync_indexer_queries_latency",
                "Latency of queries issued to the indexer, by chain and operation",
                &["chain", "op"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            indexer_failovers: register_int_counter_vec_with_registry!(
                "invoice_sync_indexer_failovers",
                "Total number of indexer endpoint switches, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            chain_reads: register_int_counter_vec_with_registry!(
                "invoice_sync_chain_reads",
                "Total number of on-chain reads, by chain and call",
                &["chain", "call"],
                registry,
            )
            .unwrap(),
            chain_read_errors: register_int_counter_vec_with_registry!(
                "invoice_sync_chain_read_errors",
                "Total number of failed on-chain reads, by chain and call",
                &["chain", "call"],
                registry,
            )
            .unwrap(),
            poll_outcomes: register_int_counter_vec_with_registry!(
                "invoice_sync_poll_outcomes",
                "Outcome of post-mutation polls, by mutation kind and outcome",
                &["kind", "outcome"],
                registry,
            )
            .unwrap(),
            poll_attempts: register_int_counter_vec_with_registry!(
                "invoice_sync_poll_attempts",
                "Total number of fetches issued by post-mutation polls, by mutation kind",
                &["kind"],
                registry,
            )
            .unwrap(),
            cache_hits: register_int_counter_vec_with_registry!(
                "invoice_sync_cache_hits",
                "Total number of fresh cache hits, by query",
                &["query"],
                registry,
            )
            .unwrap(),
            cache_misses: register_int_counter_vec_with_registry!(
                "invoice_sync_cache_misses",
                "Total number of cache misses, by query",
                &["query"],
                registry,
            )
            .unwrap(),
            cache_stale_served: register_int_counter_vec_with_registry!(
                "invoice_sync_cache_stale_served",
                "Total number of stale values served while refreshing, by query",
                &["query"],
                registry,
            )
            .unwrap(),
            cache_invalidations: register_int_counter_vec_with_registry!(
                "invoice_sync_cache_invalidations",
                "Total number of cache invalidations, by key prefix",
                &["query"],
                registry,
            )
            .unwrap(),
            aggregator_chain_errors: register_int_counter_vec_with_registry!(
                "invoice_sync_aggregator_chain_errors",
                "Total number of chains dropped from a multi-chain list, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            indexer_synced_block: register_int_gauge_vec_with_registry!(
                "invoice_sync_indexer_synced_block",
                "Latest block processed by the indexer, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            indexer_lag_blocks: register_int_gauge_vec_with_registry!(
                "invoice_sync_indexer_lag_blocks",
                "Blocks between the chain head and the indexer, by chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            indexer_healthy: register_int_gauge_vec_with_registry!(
                "invoice_sync_indexer_healthy",
                "1 when the indexer of a chain is healthy, 0 otherwise",
                &["chain"],
                registry,
            )
            .unwrap(),
            reducer_rejections: register_int_counter_vec_with_registry!(
                "invoice_sync_reducer_rejections",
                "Total number of events rejected by the reducer, by rejection type",
                &["type"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered_once_per_registry() {
        let registry = Registry::new();
        let metrics = SyncMetrics::new(&registry);
        metrics
            .indexer_queries
            .with_label_values(&["1", "fetch_one"])
            .inc();
        metrics.indexer_lag_blocks.with_label_values(&["1"]).set(7);

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"invoice_sync_indexer_queries".to_string()));
        assert!(names.contains(&"invoice_sync_indexer_lag_blocks".to_string()));
    }

    #[test]
    fn test_new_for_testing_uses_private_registry() {
        // Two instances must not collide on registration
        let a = SyncMetrics::new_for_testing();
        let b = SyncMetrics::new_for_testing();
        a.cache_hits.with_label_values(&["invoices"]).inc();
        assert_eq!(b.cache_hits.with_label_values(&["invoices"]).get(), 0);
    }
}
