// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Invoice aggregate
//!
//! The aggregate is the current state of one invoice contract, rebuilt by
//! folding its event history (see [`crate::reducer`]). Sub-entity lists are
//! append-only and every element carries the [`EventId`] that produced it.

use crate::base_types::{format_address, ChainId, EventId, InvoiceKey};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimals assumed when a token does not report its own
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Contract family an invoice belongs to; fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvoiceVariant {
    Escrow,
    SplitEscrow,
    Updatable,
    UpdatableV2,
    Instant,
}

impl InvoiceVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceVariant::Escrow => "escrow",
            InvoiceVariant::SplitEscrow => "split-escrow",
            InvoiceVariant::Updatable => "updatable",
            InvoiceVariant::UpdatableV2 => "updatable-v2",
            InvoiceVariant::Instant => "instant",
        }
    }

    /// Milestone based variants (everything except instant)
    pub fn is_escrow_family(&self) -> bool {
        !matches!(self, InvoiceVariant::Instant)
    }

    /// Variants whose parties can be replaced after creation
    pub fn is_updatable(&self) -> bool {
        matches!(self, InvoiceVariant::Updatable | InvoiceVariant::UpdatableV2)
    }
}

impl fmt::Display for InvoiceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "escrow" => Ok(InvoiceVariant::Escrow),
            "split-escrow" => Ok(InvoiceVariant::SplitEscrow),
            "updatable" => Ok(InvoiceVariant::Updatable),
            "updatable-v2" => Ok(InvoiceVariant::UpdatableV2),
            "instant" => Ok(InvoiceVariant::Instant),
            other => Err(format!("unknown invoice variant: {}", other)),
        }
    }
}

/// ERC20 metadata as read from the token contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

impl TokenMetadata {
    /// Metadata used when the token contract cannot be read
    pub fn fallback(address: Address) -> Self {
        Self {
            address,
            name: String::new(),
            symbol: String::new(),
            decimals: DEFAULT_TOKEN_DECIMALS,
            total_supply: U256::zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: EventId,
    pub sender: Address,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub id: EventId,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: EventId,
    /// Index into `Invoice::amounts`
    pub milestone: u64,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestonesAdded {
    pub id: EventId,
    pub amounts: Vec<U256>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub id: EventId,
    pub sender: Address,
    pub amount: U256,
    pub timestamp: u64,
}

/// A dispute raised by a lock event. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: String,
    pub invoice: Address,
    pub event: EventId,
    pub ipfs_hash: H256,
    pub timestamp: u64,
    pub sender: Address,
    /// Balance held by the invoice when it was locked. The indexer does not
    /// report it.
    pub amount: Option<U256>,
    /// Fee paid to open the dispute, as reported by the indexer
    pub dispute_fee: Option<U256>,
    pub reason: String,
    pub resolver: Address,
}

impl Dispute {
    pub fn tx_hash(&self) -> H256 {
        self.event.tx_hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// Outcome of a dispute. At most one per dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: String,
    pub dispute_id: String,
    pub invoice: Address,
    pub event: EventId,
    pub ipfs_hash: H256,
    pub timestamp: u64,
    pub resolver: Address,
    pub client_award: U256,
    pub provider_award: U256,
    pub resolution_fee: U256,
}

impl Resolution {
    pub fn tx_hash(&self) -> H256 {
        self.event.tx_hash
    }

    /// Total balance distributed by this resolution, fee included.
    /// `None` only on overflow, which no real token balance can reach.
    pub fn amount(&self) -> Option<U256> {
        self.client_award
            .checked_add(self.provider_award)?
            .checked_add(self.resolution_fee)
    }
}

/// Fields only carried by instant invoices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantTerms {
    pub deadline: u64,
    pub late_fee: U256,
    pub late_fee_time_interval: u64,
    pub fulfilled: bool,
    pub amount_fulfilled: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub key: InvoiceKey,
    pub variant: InvoiceVariant,
    pub network: String,
    pub created_at: u64,
    pub creation_tx_hash: H256,

    pub client: Address,
    pub provider: Address,
    pub resolver: Address,
    pub client_receiver: Option<Address>,
    pub provider_receiver: Option<Address>,

    pub token: Address,
    pub token_metadata: Option<TokenMetadata>,
    pub details: Option<H256>,

    pub amounts: Vec<U256>,
    pub current_milestone: u64,
    pub total: U256,
    pub released: U256,
    pub is_locked: bool,
    /// Safety valve date: after it an uncompleted escrow can be withdrawn by the client
    pub termination_time: u64,
    pub verified: Vec<Address>,

    pub deposits: Vec<Deposit>,
    pub withdraws: Vec<Withdraw>,
    pub releases: Vec<Release>,
    pub disputes: Vec<Dispute>,
    pub resolutions: Vec<Resolution>,
    pub milestones_added: Vec<MilestonesAdded>,
    pub tips: Vec<Tip>,

    pub instant: Option<InstantTerms>,
}

impl Invoice {
    pub fn chain_id(&self) -> ChainId {
        self.key.chain_id
    }

    pub fn address(&self) -> Address {
        self.key.address
    }

    pub fn milestone_count(&self) -> u64 {
        self.amounts.len() as u64
    }

    /// Amount required by the milestone currently awaiting release
    pub fn current_milestone_amount(&self) -> Option<U256> {
        self.amounts.get(self.current_milestone as usize).copied()
    }

    /// True while a dispute has been raised and not yet resolved
    pub fn has_open_dispute(&self) -> bool {
        self.disputes.len() > self.resolutions.len()
    }

    pub fn dispute_status(&self, dispute_id: &str) -> Option<DisputeStatus> {
        self.disputes.iter().find(|d| d.id == dispute_id)?;
        if self.resolutions.iter().any(|r| r.dispute_id == dispute_id) {
            Some(DisputeStatus::Resolved)
        } else {
            Some(DisputeStatus::Open)
        }
    }

    pub fn is_verified(&self, client: &Address) -> bool {
        self.verified.contains(client)
    }

    /// Sum of every deposit seen so far (saturating)
    pub fn deposited_total(&self) -> U256 {
        self.deposits
            .iter()
            .fold(U256::zero(), |acc, d| acc.saturating_add(d.amount))
    }

    /// Decimals of the invoice token, falling back to 18 when metadata is absent
    pub fn token_decimals(&self) -> u8 {
        self.token_metadata
            .as_ref()
            .map(|m| m.decimals)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    /// Amount due on an instant invoice at `now`, late fees included.
    ///
    /// A late fee accrues once per full `late_fee_time_interval` elapsed after
    /// the deadline. Returns `None` for escrow invoices.
    pub fn instant_total_due(&self, now: u64) -> Option<U256> {
        let terms = self.instant.as_ref()?;
        if now <= terms.deadline
            || terms.late_fee.is_zero()
            || terms.late_fee_time_interval == 0
        {
            return Some(self.total);
        }
        let intervals = (now - terms.deadline) / terms.late_fee_time_interval;
        let late_fee = terms.late_fee.saturating_mul(U256::from(intervals));
        Some(self.total.saturating_add(late_fee))
    }

    /// What the client still owes on an instant invoice at `now`
    pub fn instant_remaining_due(&self, now: u64) -> Option<U256> {
        let due = self.instant_total_due(now)?;
        Some(due.saturating_sub(self.deposited_total()))
    }

    /// Fraction of the total already released, in basis points
    pub fn released_bps(&self) -> u64 {
        if self.total.is_zero() {
            return 0;
        }
        let bps = self.released.saturating_mul(U256::from(10_000u64)) / self.total;
        bps.min(U256::from(10_000u64)).as_u64()
    }

    pub fn milestone_progress(&self) -> MilestoneProgress {
        MilestoneProgress {
            completed: self.current_milestone.min(self.milestone_count()),
            count: self.milestone_count(),
            released: self.released,
            total: self.total,
            released_bps: self.released_bps(),
        }
    }

    pub fn summary(&self) -> InvoiceSummary {
        InvoiceSummary {
            network: self.key.chain_id,
            address: self.key.address,
            variant: self.variant,
            client: self.client,
            provider: self.provider,
            token: self.token,
            total: self.total,
            released: self.released,
            is_locked: self.is_locked,
            current_milestone: self.current_milestone,
            milestone_count: self.milestone_count(),
            created_at: self.created_at,
            termination_time: self.termination_time,
        }
    }
}

impl fmt::Display for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} invoice {} (client={}, provider={})",
            self.variant,
            self.key,
            format_address(&self.client),
            format_address(&self.provider)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneProgress {
    pub completed: u64,
    pub count: u64,
    pub released: U256,
    pub total: U256,
    pub released_bps: u64,
}

/// Row shape of the "my invoices" list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub network: ChainId,
    pub address: Address,
    pub variant: InvoiceVariant,
    pub client: Address,
    pub provider: Address,
    pub token: Address,
    pub total: U256,
    pub released: U256,
    pub is_locked: bool,
    pub current_milestone: u64,
    pub milestone_count: u64,
    pub created_at: u64,
    pub termination_time: u64,
}

impl InvoiceSummary {
    pub fn key(&self) -> InvoiceKey {
        InvoiceKey::new(self.network, self.address)
    }
}
