// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::InvoiceKey;
use crate::invoice::InvoiceVariant;
use ethers::types::U256;
use thiserror::Error;

/// Why the reducer refused an event. The aggregate is never modified when an
/// event is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invoice {key} has not been created; cannot apply {event}")]
    NotCreated { key: InvoiceKey, event: &'static str },

    #[error("event for {event_key} delivered to aggregate {aggregate_key}")]
    KeyMismatch {
        aggregate_key: InvoiceKey,
        event_key: InvoiceKey,
    },

    #[error("{event} is not emitted by {variant} invoices")]
    UnsupportedEvent {
        variant: InvoiceVariant,
        event: &'static str,
    },

    #[error("milestone {milestone} out of range for {key} ({count} milestones)")]
    MilestoneOutOfRange {
        key: InvoiceKey,
        milestone: u64,
        count: u64,
    },

    #[error("release of {amount} on {key} exceeds total {total} (already released {released})")]
    ReleaseExceedsTotal {
        key: InvoiceKey,
        amount: U256,
        released: U256,
        total: U256,
    },

    #[error("invoice {key} already has an open dispute")]
    DisputeAlreadyOpen { key: InvoiceKey },

    #[error("invoice {key} has no open dispute to resolve")]
    NoOpenDispute { key: InvoiceKey },

    #[error("resolution on {key} awards more than the balance {balance}")]
    AwardsExceedBalance { key: InvoiceKey, balance: U256 },

    #[error("malformed event for {key}: {reason}")]
    Malformed { key: InvoiceKey, reason: String },
}

impl Rejection {
    /// Returns a short string identifying the rejection for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Rejection::NotCreated { .. } => "not_created",
            Rejection::KeyMismatch { .. } => "key_mismatch",
            Rejection::UnsupportedEvent { .. } => "unsupported_event",
            Rejection::MilestoneOutOfRange { .. } => "milestone_out_of_range",
            Rejection::ReleaseExceedsTotal { .. } => "release_exceeds_total",
            Rejection::DisputeAlreadyOpen { .. } => "dispute_already_open",
            Rejection::NoOpenDispute { .. } => "no_open_dispute",
            Rejection::AwardsExceedBalance { .. } => "awards_exceed_balance",
            Rejection::Malformed { .. } => "malformed",
        }
    }
}
