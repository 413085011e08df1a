// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::{ChainId, EventId, InvoiceKey};
use crate::events::{
    ChainEvent, CreationDetails, DisputeDetails, EventKind, InstantCreation, ResolutionDetails,
};
use crate::invoice::{Invoice, InvoiceVariant};
use crate::reducer::apply_event;
use ethers::types::{Address, H256, U256};

pub const TIMESTAMP: u64 = 1_000;

pub fn key() -> InvoiceKey {
    InvoiceKey::new(ChainId::MAINNET, Address::repeat_byte(0xaa))
}

pub fn tx(n: u64) -> H256 {
    H256::from_low_u64_be(0x1000 + n)
}

pub fn amounts(values: &[u64]) -> Vec<U256> {
    values.iter().map(|v| U256::from(*v)).collect()
}

pub fn event_at(tx_hash: H256, log_index: u64, kind: EventKind) -> ChainEvent {
    ChainEvent::new(EventId::new(tx_hash, log_index), TIMESTAMP, key(), kind)
}

pub fn creation(n: u64, variant: InvoiceVariant, values: &[u64]) -> ChainEvent {
    let instant = (variant == InvoiceVariant::Instant).then(|| InstantCreation {
        deadline: TIMESTAMP * 10,
        late_fee: U256::zero(),
        late_fee_time_interval: 0,
    });
    event_at(
        tx(n),
        0,
        EventKind::InvoiceCreated(CreationDetails {
            variant,
            client: Address::repeat_byte(0x01),
            provider: Address::repeat_byte(0x02),
            resolver: Address::repeat_byte(0x03),
            token: Address::repeat_byte(0x04),
            amounts: amounts(values),
            termination_time: u64::MAX,
            details: None,
            client_receiver: None,
            provider_receiver: None,
            instant,
        }),
    )
}

pub fn escrow_invoice(values: &[u64]) -> Invoice {
    apply_event(None, &creation(0, InvoiceVariant::Escrow, values)).unwrap()
}

pub fn instant_invoice(total: u64, deadline: u64) -> Invoice {
    let mut invoice = apply_event(None, &creation(0, InvoiceVariant::Instant, &[total])).unwrap();
    if let Some(terms) = invoice.instant.as_mut() {
        terms.deadline = deadline;
    }
    invoice
}

pub fn deposit(n: u64, amount: u64) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::Deposit {
            sender: Address::repeat_byte(0x01),
            amount: U256::from(amount),
        },
    )
}

pub fn release(n: u64, milestone: u64, amount: u64) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::Release {
            milestone,
            amount: U256::from(amount),
        },
    )
}

pub fn milestones_added(n: u64, values: &[u64]) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::MilestonesAdded {
            amounts: amounts(values),
        },
    )
}

pub fn lock(n: u64) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::Locked(DisputeDetails {
            sender: Address::repeat_byte(0x01),
            ipfs_hash: H256::zero(),
            amount: U256::zero(),
            reason: String::new(),
        }),
    )
}

pub fn resolve(n: u64, client_award: u64, provider_award: u64, fee: u64) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::Resolved(ResolutionDetails {
            resolver: Address::repeat_byte(0x03),
            ipfs_hash: H256::zero(),
            client_award: U256::from(client_award),
            provider_award: U256::from(provider_award),
            resolution_fee: U256::from(fee),
            balance: None,
        }),
    )
}

pub fn verified(n: u64, client: Address) -> ChainEvent {
    event_at(tx(n), 0, EventKind::Verified { client })
}

pub fn withdraw(n: u64, amount: u64) -> ChainEvent {
    event_at(
        tx(n),
        0,
        EventKind::Withdraw {
            amount: U256::from(amount),
        },
    )
}
