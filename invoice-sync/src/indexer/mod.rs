// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read access to the invoice indexer
//!
//! The indexer turns chain events into invoice aggregates and serves them per
//! chain. [`IndexerClient`] is the seam the rest of the crate talks to;
//! [`GraphQlIndexerClient`] is the production implementation.

use crate::error::IndexerResult;
use async_trait::async_trait;
use ethers::types::Address;
use invoice_types::{ChainId, Invoice, InvoiceSummary};
use serde::{Deserialize, Serialize};

mod graphql;
mod queries;
mod records;

pub use graphql::GraphQlIndexerClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBy {
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "total")]
    Total,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "createdAt",
            OrderBy::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Offset pagination over one chain's invoices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index
    pub page: u32,
    pub page_size: u32,
    pub order_by: OrderBy,
    pub direction: OrderDirection,
}

impl PageRequest {
    /// Newest first, as the list views show them
    pub fn newest_first(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            order_by: OrderBy::CreatedAt,
            direction: OrderDirection::Desc,
        }
    }

    pub fn skip(&self) -> u64 {
        self.page as u64 * self.page_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub has_indexing_errors: bool,
    pub synced_block_number: u64,
}

#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Fetch one invoice. `Ok(None)` means the indexer has not seen it yet.
    async fn fetch_one(&self, chain: ChainId, address: Address) -> IndexerResult<Option<Invoice>>;

    /// Invoices where `owner` is client or provider
    async fn fetch_page(
        &self,
        chain: ChainId,
        owner: Address,
        page: PageRequest,
    ) -> IndexerResult<Vec<InvoiceSummary>>;

    async fn sync_status(&self, chain: ChainId) -> IndexerResult<SyncStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_page_times_size() {
        assert_eq!(PageRequest::newest_first(0, 10).skip(), 0);
        assert_eq!(PageRequest::newest_first(3, 10).skip(), 30);
        assert_eq!(
            PageRequest::newest_first(u32::MAX, u32::MAX).skip(),
            u32::MAX as u64 * u32::MAX as u64
        );
    }

    #[test]
    fn test_order_labels() {
        let page = PageRequest::newest_first(0, 10);
        assert_eq!(page.order_by.as_str(), "createdAt");
        assert_eq!(page.direction.as_str(), "desc");
    }
}
