// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain events consumed by the reducer
//!
//! Every contract variant emits a subset of [`EventKind`]. The kind is decided
//! once, when the log is decoded, so the reducer never probes payload fields.

use crate::base_types::{EventId, InvoiceKey};
use crate::invoice::InvoiceVariant;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// A decoded chain event addressed to one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub id: EventId,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    pub invoice: InvoiceKey,
    pub kind: EventKind,
}

impl ChainEvent {
    pub fn new(id: EventId, timestamp: u64, invoice: InvoiceKey, kind: EventKind) -> Self {
        Self {
            id,
            timestamp,
            invoice,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Factory event; the first event of every invoice
    InvoiceCreated(CreationDetails),
    Deposit { sender: Address, amount: U256 },
    /// Funds released for `milestone` (index into the milestone amounts)
    Release { milestone: u64, amount: U256 },
    MilestonesAdded { amounts: Vec<U256> },
    Locked(DisputeDetails),
    Resolved(ResolutionDetails),
    Verified { client: Address },
    Withdraw { amount: U256 },
    Fulfilled { amount: U256 },
    TipDeposited { sender: Address, amount: U256 },
    ClientUpdated { client: Address },
    ProviderUpdated { provider: Address },
    ProviderReceiverUpdated { receiver: Address },
    ClientReceiverUpdated { receiver: Address },
}

impl EventKind {
    /// Event name for logging and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::InvoiceCreated(_) => "invoice_created",
            EventKind::Deposit { .. } => "deposit",
            EventKind::Release { .. } => "release",
            EventKind::MilestonesAdded { .. } => "milestones_added",
            EventKind::Locked(_) => "locked",
            EventKind::Resolved(_) => "resolved",
            EventKind::Verified { .. } => "verified",
            EventKind::Withdraw { .. } => "withdraw",
            EventKind::Fulfilled { .. } => "fulfilled",
            EventKind::TipDeposited { .. } => "tip_deposited",
            EventKind::ClientUpdated { .. } => "client_updated",
            EventKind::ProviderUpdated { .. } => "provider_updated",
            EventKind::ProviderReceiverUpdated { .. } => "provider_receiver_updated",
            EventKind::ClientReceiverUpdated { .. } => "client_receiver_updated",
        }
    }

    /// Whether a contract of `variant` can emit this event
    pub fn is_valid_for(&self, variant: InvoiceVariant) -> bool {
        match self {
            EventKind::InvoiceCreated(_)
            | EventKind::Deposit { .. }
            | EventKind::Verified { .. }
            | EventKind::Withdraw { .. } => true,
            EventKind::Release { .. }
            | EventKind::MilestonesAdded { .. }
            | EventKind::Locked(_)
            | EventKind::Resolved(_) => variant.is_escrow_family(),
            EventKind::Fulfilled { .. } | EventKind::TipDeposited { .. } => {
                variant == InvoiceVariant::Instant
            }
            EventKind::ClientUpdated { .. }
            | EventKind::ProviderUpdated { .. }
            | EventKind::ProviderReceiverUpdated { .. } => variant.is_updatable(),
            EventKind::ClientReceiverUpdated { .. } => variant == InvoiceVariant::UpdatableV2,
        }
    }
}

/// Payload of the factory creation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationDetails {
    pub variant: InvoiceVariant,
    pub client: Address,
    pub provider: Address,
    pub resolver: Address,
    pub token: Address,
    pub amounts: Vec<U256>,
    pub termination_time: u64,
    pub details: Option<H256>,
    pub client_receiver: Option<Address>,
    pub provider_receiver: Option<Address>,
    /// Present exactly when `variant` is instant
    pub instant: Option<InstantCreation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantCreation {
    pub deadline: u64,
    pub late_fee: U256,
    pub late_fee_time_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeDetails {
    pub sender: Address,
    pub ipfs_hash: H256,
    /// Balance held by the invoice at lock time
    pub amount: U256,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDetails {
    pub resolver: Address,
    pub ipfs_hash: H256,
    pub client_award: U256,
    pub provider_award: U256,
    pub resolution_fee: U256,
    /// Invoice balance right before resolution, when the source knows it
    pub balance: Option<U256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_events_rejected_for_instant() {
        let release = EventKind::Release {
            milestone: 0,
            amount: U256::one(),
        };
        assert!(release.is_valid_for(InvoiceVariant::Escrow));
        assert!(release.is_valid_for(InvoiceVariant::SplitEscrow));
        assert!(!release.is_valid_for(InvoiceVariant::Instant));
    }

    #[test]
    fn test_instant_events_rejected_for_escrow() {
        let fulfilled = EventKind::Fulfilled {
            amount: U256::one(),
        };
        assert!(fulfilled.is_valid_for(InvoiceVariant::Instant));
        for variant in [
            InvoiceVariant::Escrow,
            InvoiceVariant::SplitEscrow,
            InvoiceVariant::Updatable,
            InvoiceVariant::UpdatableV2,
        ] {
            assert!(!fulfilled.is_valid_for(variant), "{:?}", variant);
        }
    }

    #[test]
    fn test_receiver_updates_per_variant() {
        let provider_receiver = EventKind::ProviderReceiverUpdated {
            receiver: Address::zero(),
        };
        let client_receiver = EventKind::ClientReceiverUpdated {
            receiver: Address::zero(),
        };
        assert!(provider_receiver.is_valid_for(InvoiceVariant::Updatable));
        assert!(provider_receiver.is_valid_for(InvoiceVariant::UpdatableV2));
        assert!(!provider_receiver.is_valid_for(InvoiceVariant::Escrow));
        assert!(!client_receiver.is_valid_for(InvoiceVariant::Updatable));
        assert!(client_receiver.is_valid_for(InvoiceVariant::UpdatableV2));
    }

    #[test]
    fn test_common_events_valid_everywhere() {
        let verified = EventKind::Verified {
            client: Address::zero(),
        };
        let withdraw = EventKind::Withdraw {
            amount: U256::one(),
        };
        for variant in [
            InvoiceVariant::Escrow,
            InvoiceVariant::SplitEscrow,
            InvoiceVariant::Updatable,
            InvoiceVariant::UpdatableV2,
            InvoiceVariant::Instant,
        ] {
            assert!(verified.is_valid_for(variant));
            assert!(withdraw.is_valid_for(variant));
        }
    }
}
