// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Status state machine: maps an invoice snapshot to a display label.

use crate::invoice::{Invoice, InvoiceVariant};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusLabel {
    AwaitingDeposit,
    PartiallyFunded,
    Funded,
    Completed,
    DisputeResolved,
    Expired,
    InDispute,
    Overdue,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::AwaitingDeposit => "Awaiting Deposit",
            StatusLabel::PartiallyFunded => "Partially Funded",
            StatusLabel::Funded => "Funded",
            StatusLabel::Completed => "Completed",
            StatusLabel::DisputeResolved => "Dispute Resolved",
            StatusLabel::Expired => "Expired",
            StatusLabel::InDispute => "In Dispute",
            StatusLabel::Overdue => "Overdue",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatus {
    pub funded: bool,
    pub label: StatusLabel,
}

impl InvoiceStatus {
    fn new(funded: bool, label: StatusLabel) -> Self {
        Self { funded, label }
    }
}

/// Live token balance of the invoice contract.
///
/// Read from the chain, not the indexer, so it may be ahead of the rest of
/// the snapshot. `observed_at` records when it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReading {
    pub amount: U256,
    pub observed_at: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    /// Unix seconds
    pub now: u64,
    /// Without a reading the balance rules are skipped
    pub balance: Option<BalanceReading>,
}

impl StatusInputs {
    pub fn at(now: u64) -> Self {
        Self { now, balance: None }
    }

    pub fn with_balance(now: u64, amount: U256, observed_at: u64) -> Self {
        Self {
            now,
            balance: Some(BalanceReading {
                amount,
                observed_at,
            }),
        }
    }
}

/// Derive the status of `invoice`. First matching rule wins.
pub fn derive_status(invoice: &Invoice, inputs: &StatusInputs) -> InvoiceStatus {
    match invoice.variant {
        InvoiceVariant::Instant => instant_status(invoice, inputs.now),
        _ => escrow_status(invoice, inputs),
    }
}

fn escrow_status(invoice: &Invoice, inputs: &StatusInputs) -> InvoiceStatus {
    let all_released = invoice.current_milestone >= invoice.milestone_count();
    if all_released && !invoice.resolutions.is_empty() && !invoice.has_open_dispute() {
        return InvoiceStatus::new(true, StatusLabel::DisputeResolved);
    }
    if all_released {
        return InvoiceStatus::new(true, StatusLabel::Completed);
    }

    if let Some(balance) = inputs.balance {
        let required = invoice.current_milestone_amount().unwrap_or_default();
        if !required.is_zero() && !invoice.deposits.is_empty() && balance.amount < required {
            return InvoiceStatus::new(!invoice.is_locked, StatusLabel::PartiallyFunded);
        }
        if balance.amount >= required {
            return InvoiceStatus::new(!invoice.is_locked, StatusLabel::Funded);
        }
    }

    if invoice.termination_time < inputs.now {
        return InvoiceStatus::new(true, StatusLabel::Expired);
    }
    if invoice.is_locked {
        return InvoiceStatus::new(true, StatusLabel::InDispute);
    }
    InvoiceStatus::new(false, StatusLabel::AwaitingDeposit)
}

fn instant_status(invoice: &Invoice, now: u64) -> InvoiceStatus {
    let terms = invoice.instant.as_ref();
    if terms.map_or(false, |t| t.fulfilled) {
        return InvoiceStatus::new(true, StatusLabel::Completed);
    }
    if !invoice.deposits.is_empty() {
        return InvoiceStatus::new(true, StatusLabel::PartiallyFunded);
    }
    if terms.map_or(false, |t| t.deadline < now) {
        return InvoiceStatus::new(false, StatusLabel::Overdue);
    }
    InvoiceStatus::new(false, StatusLabel::AwaitingDeposit)
}
