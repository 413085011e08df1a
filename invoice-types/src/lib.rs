// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pure core of the invoice synchronization stack: the invoice aggregate,
//! the events that build it, the reducer that folds them and the status
//! state machine. No I/O happens in this crate.

pub mod base_types;
pub mod error;
pub mod events;
pub mod invoice;
pub mod reducer;
pub mod status;

#[cfg(test)]
pub(crate) mod test_utils;

pub use base_types::{format_address, ChainId, EventId, InvoiceKey};
pub use error::Rejection;
pub use events::{
    ChainEvent, CreationDetails, DisputeDetails, EventKind, InstantCreation, ResolutionDetails,
};
pub use invoice::{
    Deposit, Dispute, DisputeStatus, InstantTerms, Invoice, InvoiceSummary, InvoiceVariant,
    MilestoneProgress, MilestonesAdded, Release, Resolution, Tip, TokenMetadata, Withdraw,
    DEFAULT_TOKEN_DECIMALS,
};
pub use reducer::{apply_event, fold_events, FoldOutcome};
pub use status::{derive_status, BalanceReading, InvoiceStatus, StatusInputs, StatusLabel};
