// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Keeps invoice reads consistent with the chain: indexer access with
//! failover, multi-chain listing, read-after-write polling, a
//! stale-while-revalidate aggregate cache and indexer health checks.

pub mod aggregator;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod indexer;
pub mod metrics;
pub mod mutation;
pub mod poller;
pub mod service;
pub mod token;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aggregator::{ChainAggregator, ChainError, MultiChainPage};
pub use cache::{AggregateCache, CacheKey, CacheStats};
pub use config::SyncConfig;
pub use error::{ChainReadError, IndexerError, ServiceError, ServiceResult};
pub use health::{check_health, HealthMonitor, HealthReport, IndexerHealth};
pub use indexer::{GraphQlIndexerClient, IndexerClient, PageRequest, SyncStatus};
pub use mutation::{MutationKind, MutationSync, SyncOutcome};
pub use poller::{wait_for, PollOptions};
pub use service::{DetailsState, InvoiceDetails, InvoiceService};
