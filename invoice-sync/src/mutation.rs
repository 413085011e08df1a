// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read-after-write synchronization
//!
//! After a transaction that mutates an invoice is confirmed, the indexer still
//! serves the pre-mutation aggregate for a while. [`MutationSync`] re-pulls the
//! invoice until it reflects the mutation and then drops the cached reads that
//! would otherwise keep showing the old state.

use crate::cache::{AggregateCache, CacheKey};
use crate::indexer::IndexerClient;
use crate::metrics::SyncMetrics;
use crate::poller::{wait_for, PollOptions};
use ethers::types::Address;
use invoice_types::{ChainId, Invoice};
use std::sync::Arc;
use strum_macros::Display;
use tracing::{info, warn};

/// Kinds of writes whose effect is awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Deposit,
    Release,
    Lock,
    Resolve,
    Withdraw,
    /// `verified` is a set, so the attesting client is checked by address
    Verify {
        client: Address,
    },
    AddMilestones,
    Tip,
}

impl MutationKind {
    /// Whether `fresh` shows the effect of this mutation applied to `before`
    pub fn is_reflected(&self, before: &Invoice, fresh: &Invoice) -> bool {
        match self {
            MutationKind::Deposit => fresh.deposits.len() > before.deposits.len(),
            MutationKind::Release => fresh.releases.len() > before.releases.len(),
            MutationKind::Lock => fresh.disputes.len() > before.disputes.len(),
            MutationKind::Resolve => fresh.resolutions.len() > before.resolutions.len(),
            MutationKind::Withdraw => fresh.withdraws.len() > before.withdraws.len(),
            MutationKind::Verify { client } => fresh.is_verified(client),
            MutationKind::AddMilestones => fresh.amounts.len() > before.amounts.len(),
            MutationKind::Tip => fresh.tips.len() > before.tips.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The indexer reflects the mutation; the fresh aggregate is attached
    Settled(Box<Invoice>),
    /// The poll window closed first. The mutation may still land later.
    TimedOut,
}

impl SyncOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, SyncOutcome::Settled(_))
    }

    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Settled(_) => "settled",
            SyncOutcome::TimedOut => "timed_out",
        }
    }
}

pub struct MutationSync {
    indexer: Arc<dyn IndexerClient>,
    cache: AggregateCache,
    options: PollOptions,
    metrics: Arc<SyncMetrics>,
}

impl MutationSync {
    pub fn new(
        indexer: Arc<dyn IndexerClient>,
        cache: AggregateCache,
        options: PollOptions,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            indexer,
            cache,
            options,
            metrics,
        }
    }

    /// Wait until the indexer shows `kind` applied to `before`, then
    /// invalidate the invoice's details and every cached list.
    ///
    /// On timeout the cache is left alone and `TimedOut` is returned.
    pub async fn after_mutation(&self, kind: MutationKind, before: &Invoice) -> SyncOutcome {
        let key = before.key;
        let label = format!("{} on {}", kind, key);
        let kind_label = kind.to_string();
        let attempts = self.metrics.poll_attempts.with_label_values(&[&kind_label]);

        let fresh = wait_for(
            &label,
            || {
                attempts.inc();
                self.indexer.fetch_one(key.chain_id, key.address)
            },
            |fetched: &Option<Invoice>| {
                fetched
                    .as_ref()
                    .is_some_and(|fresh| kind.is_reflected(before, fresh))
            },
            self.options,
        )
        .await
        .flatten();

        let outcome = match fresh {
            Some(invoice) => {
                self.cache.invalidate(&CacheKey::invoice_details(&key)).await;
                self.cache.invalidate(&CacheKey::all_invoices()).await;
                info!("[Sync] {} settled", label);
                SyncOutcome::Settled(Box::new(invoice))
            }
            None => {
                warn!(
                    "[Sync] {} not visible on the indexer after {:?}",
                    label, self.options.timeout
                );
                SyncOutcome::TimedOut
            }
        };
        self.metrics
            .poll_outcomes
            .with_label_values(&[&kind_label, outcome.label()])
            .inc();
        outcome
    }

    /// Wait until the indexer of `chain` has processed `block`, typically the
    /// block of a mutation's receipt. Returns false on timeout.
    pub async fn wait_for_block(&self, chain: ChainId, block: u64) -> bool {
        let label = format!("block {} on chain {}", block, chain);
        let reached = wait_for(
            &label,
            || self.indexer.sync_status(chain),
            |status| status.synced_block_number >= block,
            self.options,
        )
        .await
        .is_some();
        self.metrics
            .poll_outcomes
            .with_label_values(&["block", if reached { "settled" } else { "timed_out" }])
            .inc();
        reached
    }
}
