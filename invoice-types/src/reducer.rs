// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event reducer
//!
//! Folds chain events onto an invoice aggregate. The reducer is the only
//! writer of [`Invoice`]; everything else reads snapshots.
//!
//! Guarantees:
//! - **Idempotent**: every list element is keyed by its [`EventId`], so a
//!   redelivered event returns the aggregate unchanged.
//! - **Fail-closed**: an event that does not fit the aggregate (wrong variant,
//!   milestone out of range, second open dispute, ...) is rejected and the
//!   aggregate is left untouched.
//! - **Ordered**: events are applied in delivery order; nothing is reordered.

use crate::base_types::{format_address, EventId};
use crate::error::Rejection;
use crate::events::{ChainEvent, CreationDetails, EventKind};
use crate::invoice::{
    Deposit, Dispute, InstantTerms, Invoice, MilestonesAdded, Release, Resolution, Tip, Withdraw,
};
use ethers::types::U256;
use tracing::{debug, warn};

/// Apply one event to the current aggregate (or to nothing, for a creation).
///
/// On success the returned aggregate is the new state; on rejection the
/// caller keeps its current aggregate.
pub fn apply_event(current: Option<&Invoice>, event: &ChainEvent) -> Result<Invoice, Rejection> {
    let invoice = match (current, &event.kind) {
        (None, EventKind::InvoiceCreated(details)) => return create(event, details),
        (None, kind) => {
            return Err(Rejection::NotCreated {
                key: event.invoice,
                event: kind.name(),
            })
        }
        (Some(invoice), EventKind::InvoiceCreated(_)) => {
            warn!(
                "[Reducer] Duplicate creation for {}: tx={:?}, ignoring",
                invoice.key, event.id.tx_hash
            );
            return Ok(invoice.clone());
        }
        (Some(invoice), _) => invoice,
    };

    if invoice.key != event.invoice {
        return Err(Rejection::KeyMismatch {
            aggregate_key: invoice.key,
            event_key: event.invoice,
        });
    }
    if !event.kind.is_valid_for(invoice.variant) {
        return Err(Rejection::UnsupportedEvent {
            variant: invoice.variant,
            event: event.kind.name(),
        });
    }
    if already_applied(invoice, &event.kind, &event.id) {
        debug!(
            "[Reducer] {} {} already applied to {}, skipping",
            event.kind.name(),
            event.id,
            invoice.key
        );
        return Ok(invoice.clone());
    }

    let mut next = invoice.clone();
    match &event.kind {
        // Handled above
        EventKind::InvoiceCreated(_) => {}
        EventKind::Deposit { sender, amount } => {
            next.deposits.push(Deposit {
                id: event.id,
                sender: *sender,
                amount: *amount,
                timestamp: event.timestamp,
            });
        }
        EventKind::Release { milestone, amount } => {
            if *milestone >= next.milestone_count() {
                return Err(Rejection::MilestoneOutOfRange {
                    key: next.key,
                    milestone: *milestone,
                    count: next.milestone_count(),
                });
            }
            let released = next
                .released
                .checked_add(*amount)
                .filter(|released| *released <= next.total)
                .ok_or(Rejection::ReleaseExceedsTotal {
                    key: next.key,
                    amount: *amount,
                    released: next.released,
                    total: next.total,
                })?;
            next.released = released;
            next.current_milestone = next.current_milestone.max(milestone + 1);
            next.releases.push(Release {
                id: event.id,
                milestone: *milestone,
                amount: *amount,
                timestamp: event.timestamp,
            });
        }
        EventKind::MilestonesAdded { amounts } => {
            let added = sum(amounts).ok_or_else(|| overflow(&next, "milestone amounts"))?;
            next.total = next
                .total
                .checked_add(added)
                .ok_or_else(|| overflow(&next, "invoice total"))?;
            next.amounts.extend_from_slice(amounts);
            next.milestones_added.push(MilestonesAdded {
                id: event.id,
                amounts: amounts.clone(),
                timestamp: event.timestamp,
            });
        }
        EventKind::Locked(details) => {
            if next.has_open_dispute() {
                return Err(Rejection::DisputeAlreadyOpen { key: next.key });
            }
            let index = next.disputes.len();
            next.is_locked = true;
            next.disputes.push(Dispute {
                id: dispute_id(&next, index),
                invoice: next.key.address,
                event: event.id,
                ipfs_hash: details.ipfs_hash,
                timestamp: event.timestamp,
                sender: details.sender,
                amount: Some(details.amount),
                dispute_fee: None,
                reason: details.reason.clone(),
                resolver: next.resolver,
            });
        }
        EventKind::Resolved(details) => {
            if !next.has_open_dispute() {
                return Err(Rejection::NoOpenDispute { key: next.key });
            }
            let awarded = details
                .client_award
                .checked_add(details.provider_award)
                .and_then(|sum| sum.checked_add(details.resolution_fee));
            if let Some(balance) = details.balance {
                if awarded.map_or(true, |awarded| awarded > balance) {
                    return Err(Rejection::AwardsExceedBalance {
                        key: next.key,
                        balance,
                    });
                }
            }
            let dispute_id = next
                .disputes
                .last()
                .map(|d| d.id.clone())
                .unwrap_or_default();
            let index = next.resolutions.len();
            next.is_locked = false;
            next.resolutions.push(Resolution {
                id: format!("{}-resolution-{}", format_address(&next.key.address), index),
                dispute_id,
                invoice: next.key.address,
                event: event.id,
                ipfs_hash: details.ipfs_hash,
                timestamp: event.timestamp,
                resolver: details.resolver,
                client_award: details.client_award,
                provider_award: details.provider_award,
                resolution_fee: details.resolution_fee,
            });
        }
        EventKind::Verified { client } => {
            if !next.verified.contains(client) {
                next.verified.push(*client);
            }
        }
        EventKind::Withdraw { amount } => {
            next.withdraws.push(Withdraw {
                id: event.id,
                amount: *amount,
                timestamp: event.timestamp,
            });
        }
        EventKind::Fulfilled { amount } => {
            let terms = next.instant.as_mut().ok_or_else(|| Rejection::Malformed {
                key: invoice.key,
                reason: "instant invoice without instant terms".to_string(),
            })?;
            terms.fulfilled = true;
            terms.amount_fulfilled = *amount;
        }
        EventKind::TipDeposited { sender, amount } => {
            next.tips.push(Tip {
                id: event.id,
                sender: *sender,
                amount: *amount,
                timestamp: event.timestamp,
            });
        }
        EventKind::ClientUpdated { client } => next.client = *client,
        EventKind::ProviderUpdated { provider } => next.provider = *provider,
        EventKind::ProviderReceiverUpdated { receiver } => {
            next.provider_receiver = Some(*receiver)
        }
        EventKind::ClientReceiverUpdated { receiver } => next.client_receiver = Some(*receiver),
    }

    debug!(
        "[Reducer] Applied {} {} to {}",
        event.kind.name(),
        event.id,
        next.key
    );
    Ok(next)
}

/// Result of folding a stream of events
#[derive(Debug, Clone, Default)]
pub struct FoldOutcome {
    pub invoice: Option<Invoice>,
    pub rejected: Vec<(EventId, Rejection)>,
}

/// Apply `events` in delivery order, starting from `initial`.
///
/// Rejected events are logged and collected; folding continues from the last
/// accepted state.
pub fn fold_events<'a>(
    initial: Option<Invoice>,
    events: impl IntoIterator<Item = &'a ChainEvent>,
) -> FoldOutcome {
    let mut outcome = FoldOutcome {
        invoice: initial,
        rejected: Vec::new(),
    };
    for event in events {
        match apply_event(outcome.invoice.as_ref(), event) {
            Ok(next) => outcome.invoice = Some(next),
            Err(rejection) => {
                warn!(
                    "[Reducer] Rejected {} {} for {}: {}",
                    event.kind.name(),
                    event.id,
                    event.invoice,
                    rejection
                );
                outcome.rejected.push((event.id, rejection));
            }
        }
    }
    outcome
}

fn create(event: &ChainEvent, details: &CreationDetails) -> Result<Invoice, Rejection> {
    let malformed = |reason: &str| Rejection::Malformed {
        key: event.invoice,
        reason: reason.to_string(),
    };
    let instant = match (details.variant.is_escrow_family(), &details.instant) {
        (true, None) => None,
        (false, Some(terms)) => Some(InstantTerms {
            deadline: terms.deadline,
            late_fee: terms.late_fee,
            late_fee_time_interval: terms.late_fee_time_interval,
            fulfilled: false,
            amount_fulfilled: U256::zero(),
        }),
        (true, Some(_)) => return Err(malformed("escrow invoice created with instant terms")),
        (false, None) => return Err(malformed("instant invoice created without instant terms")),
    };
    let total = sum(&details.amounts).ok_or_else(|| malformed("milestone amounts overflow"))?;

    debug!(
        "[Reducer] Created {} invoice {} with {} milestones",
        details.variant,
        event.invoice,
        details.amounts.len()
    );
    Ok(Invoice {
        key: event.invoice,
        variant: details.variant,
        network: event.invoice.chain_id.network(),
        created_at: event.timestamp,
        creation_tx_hash: event.id.tx_hash,
        client: details.client,
        provider: details.provider,
        resolver: details.resolver,
        client_receiver: details.client_receiver,
        provider_receiver: details.provider_receiver,
        token: details.token,
        token_metadata: None,
        details: details.details,
        amounts: details.amounts.clone(),
        current_milestone: 0,
        total,
        released: U256::zero(),
        is_locked: false,
        termination_time: details.termination_time,
        verified: Vec::new(),
        deposits: Vec::new(),
        withdraws: Vec::new(),
        releases: Vec::new(),
        disputes: Vec::new(),
        resolutions: Vec::new(),
        milestones_added: Vec::new(),
        tips: Vec::new(),
        instant,
    })
}

fn already_applied(invoice: &Invoice, kind: &EventKind, id: &EventId) -> bool {
    match kind {
        EventKind::Deposit { .. } => invoice.deposits.iter().any(|d| d.id == *id),
        EventKind::Release { .. } => invoice.releases.iter().any(|r| r.id == *id),
        EventKind::MilestonesAdded { .. } => invoice.milestones_added.iter().any(|m| m.id == *id),
        EventKind::Locked(_) => invoice.disputes.iter().any(|d| d.event == *id),
        EventKind::Resolved(_) => invoice.resolutions.iter().any(|r| r.event == *id),
        EventKind::Withdraw { .. } => invoice.withdraws.iter().any(|w| w.id == *id),
        EventKind::TipDeposited { .. } => invoice.tips.iter().any(|t| t.id == *id),
        // Set or assignment semantics: reapplying produces the same state
        EventKind::InvoiceCreated(_)
        | EventKind::Verified { .. }
        | EventKind::Fulfilled { .. }
        | EventKind::ClientUpdated { .. }
        | EventKind::ProviderUpdated { .. }
        | EventKind::ProviderReceiverUpdated { .. }
        | EventKind::ClientReceiverUpdated { .. } => false,
    }
}

fn dispute_id(invoice: &Invoice, index: usize) -> String {
    format!("{}-dispute-{}", format_address(&invoice.key.address), index)
}

fn sum(amounts: &[U256]) -> Option<U256> {
    amounts
        .iter()
        .try_fold(U256::zero(), |acc, amount| acc.checked_add(*amount))
}

fn overflow(invoice: &Invoice, what: &str) -> Rejection {
    Rejection::Malformed {
        key: invoice.key,
        reason: format!("{} overflow", what),
    }
}
