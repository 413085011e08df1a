// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! "My invoices" across every configured chain
//!
//! Each chain's indexer is paged independently, so page `n` of the merged list
//! is the union of page `n` of every chain. Rows are not re-balanced between
//! chains: a chain with many recent invoices can push older rows of another
//! chain onto a later merged page than strict global ordering would.

use crate::error::IndexerError;
use crate::indexer::{IndexerClient, PageRequest};
use crate::metrics::SyncMetrics;
use ethers::types::Address;
use futures::future::join_all;
use invoice_types::{ChainId, InvoiceSummary};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A chain whose page could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainError {
    pub chain: ChainId,
    pub error: IndexerError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiChainPage {
    /// Deduplicated rows, newest first
    pub invoices: Vec<InvoiceSummary>,
    pub errors: Vec<ChainError>,
}

impl MultiChainPage {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct ChainAggregator {
    indexer: Arc<dyn IndexerClient>,
    chains: Vec<ChainId>,
    page_size: u32,
    metrics: Arc<SyncMetrics>,
}

impl ChainAggregator {
    pub fn new(
        indexer: Arc<dyn IndexerClient>,
        chains: Vec<ChainId>,
        page_size: u32,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            indexer,
            chains,
            page_size,
            metrics,
        }
    }

    pub fn chains(&self) -> &[ChainId] {
        &self.chains
    }

    /// Fetch page `page` of `owner`'s invoices from every chain concurrently.
    ///
    /// A failing chain contributes no rows and one [`ChainError`]; the other
    /// chains are still returned.
    pub async fn list_invoices(&self, owner: Address, page: u32) -> MultiChainPage {
        let request = PageRequest::newest_first(page, self.page_size);
        let fetches = self.chains.iter().map(|chain| async move {
            let result = self.indexer.fetch_page(*chain, owner, request).await;
            (*chain, result)
        });
        let results = join_all(fetches).await;

        let mut merged = MultiChainPage::default();
        let mut rows = Vec::new();
        for (chain, result) in results {
            match result {
                Ok(page_rows) => rows.extend(page_rows),
                Err(error) => {
                    warn!(
                        "[Aggregator] Chain {} failed for owner {:?}: {}",
                        chain, owner, error
                    );
                    self.metrics
                        .aggregator_chain_errors
                        .with_label_values(&[&chain.to_string()])
                        .inc();
                    merged.errors.push(ChainError { chain, error });
                }
            }
        }

        merged.invoices = merge_rows(rows);
        debug!(
            "[Aggregator] page {} for {:?}: {} rows from {} chains ({} failed)",
            page,
            owner,
            merged.invoices.len(),
            self.chains.len(),
            merged.errors.len()
        );
        merged
    }
}

/// Drop repeated `(network, address)` rows, keeping the first, then sort by
/// creation time, newest first. The sort is stable so ties keep chain order.
pub fn merge_rows(rows: Vec<InvoiceSummary>) -> Vec<InvoiceSummary> {
    let mut seen = HashSet::new();
    let mut unique: Vec<InvoiceSummary> = rows
        .into_iter()
        .filter(|row| seen.insert((row.network, row.address)))
        .collect();
    unique.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    unique
}
