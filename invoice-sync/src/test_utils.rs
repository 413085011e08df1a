// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory indexer and chain reader used by the tests of this crate.

use crate::chain::ChainReader;
use crate::error::{ChainReadError, ChainReadResult, IndexerError, IndexerResult};
use crate::indexer::{IndexerClient, PageRequest, SyncStatus};
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use invoice_types::{
    apply_event, ChainEvent, ChainId, CreationDetails, EventId, EventKind, Invoice, InvoiceKey,
    InvoiceSummary, InvoiceVariant, TokenMetadata,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[allow(clippy::type_complexity)]
#[derive(Clone, Debug, Default)]
pub struct MockIndexerClient {
    invoices: Arc<Mutex<HashMap<(ChainId, Address), Invoice>>>,
    pages: Arc<Mutex<HashMap<ChainId, IndexerResult<Vec<InvoiceSummary>>>>>,
    sync_status: Arc<Mutex<HashMap<ChainId, IndexerResult<SyncStatus>>>>,
    page_requests: Arc<Mutex<Vec<(ChainId, Address, PageRequest)>>>,
    fetch_one_calls: Arc<AtomicUsize>,
    fetch_one_error: Arc<Mutex<Option<IndexerError>>>,
}

impl MockIndexerClient {
    pub fn set_invoice(&self, invoice: Invoice) {
        self.invoices
            .lock()
            .unwrap()
            .insert((invoice.chain_id(), invoice.address()), invoice);
    }

    pub fn set_page(&self, chain: ChainId, rows: Vec<InvoiceSummary>) {
        self.pages.lock().unwrap().insert(chain, Ok(rows));
    }

    pub fn set_page_error(&self, chain: ChainId, error: IndexerError) {
        self.pages.lock().unwrap().insert(chain, Err(error));
    }

    pub fn set_sync_status(&self, chain: ChainId, synced_block_number: u64, errors: bool) {
        self.sync_status.lock().unwrap().insert(
            chain,
            Ok(SyncStatus {
                has_indexing_errors: errors,
                synced_block_number,
            }),
        );
    }

    pub fn set_sync_status_error(&self, chain: ChainId, error: IndexerError) {
        self.sync_status.lock().unwrap().insert(chain, Err(error));
    }

    /// Make every `fetch_one` fail until cleared with `None`
    pub fn set_fetch_one_error(&self, error: Option<IndexerError>) {
        *self.fetch_one_error.lock().unwrap() = error;
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> Vec<(ChainId, Address, PageRequest)> {
        self.page_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexerClient for MockIndexerClient {
    async fn fetch_one(&self, chain: ChainId, address: Address) -> IndexerResult<Option<Invoice>> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fetch_one_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.invoices.lock().unwrap().get(&(chain, address)).cloned())
    }

    async fn fetch_page(
        &self,
        chain: ChainId,
        owner: Address,
        page: PageRequest,
    ) -> IndexerResult<Vec<InvoiceSummary>> {
        self.page_requests
            .lock()
            .unwrap()
            .push((chain, owner, page));
        self.pages
            .lock()
            .unwrap()
            .get(&chain)
            .cloned()
            .unwrap_or(Ok(vec![]))
    }

    async fn sync_status(&self, chain: ChainId) -> IndexerResult<SyncStatus> {
        self.sync_status
            .lock()
            .unwrap()
            .get(&chain)
            .cloned()
            .unwrap_or(Err(IndexerError::UnknownChain(chain)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockChainReader {
    latest_blocks: Arc<Mutex<HashMap<ChainId, u64>>>,
    balances: Arc<Mutex<HashMap<(ChainId, Address, Address), U256>>>,
    metadata: Arc<Mutex<HashMap<(ChainId, Address), TokenMetadata>>>,
    metadata_reads: Arc<AtomicUsize>,
    balance_reads: Arc<AtomicUsize>,
}

impl MockChainReader {
    pub fn set_latest_block(&self, chain: ChainId, block: u64) {
        self.latest_blocks.lock().unwrap().insert(chain, block);
    }

    pub fn set_balance(&self, chain: ChainId, token: Address, holder: Address, amount: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert((chain, token, holder), U256::from(amount));
    }

    pub fn set_metadata(&self, chain: ChainId, metadata: TokenMetadata) {
        self.metadata
            .lock()
            .unwrap()
            .insert((chain, metadata.address), metadata);
    }

    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::SeqCst)
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn latest_block_number(&self, chain: ChainId) -> ChainReadResult<u64> {
        self.latest_blocks
            .lock()
            .unwrap()
            .get(&chain)
            .copied()
            .ok_or(ChainReadError::UnknownChain(chain))
    }

    async fn token_balance(
        &self,
        chain: ChainId,
        token: Address,
        holder: Address,
    ) -> ChainReadResult<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.balances
            .lock()
            .unwrap()
            .get(&(chain, token, holder))
            .copied()
            .ok_or_else(|| ChainReadError::Provider("balance not mocked".to_string()))
    }

    async fn erc20_metadata(
        &self,
        chain: ChainId,
        token: Address,
    ) -> ChainReadResult<TokenMetadata> {
        self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .lock()
            .unwrap()
            .get(&(chain, token))
            .cloned()
            .ok_or(ChainReadError::Contract {
                call: "decimals",
                reason: "execution reverted".to_string(),
            })
    }
}

pub const TOKEN: Address = Address::repeat_byte(0x04);
pub const CLIENT: Address = Address::repeat_byte(0x01);
pub const PROVIDER: Address = Address::repeat_byte(0x02);

fn event(key: InvoiceKey, n: u64, kind: EventKind) -> ChainEvent {
    ChainEvent::new(
        EventId::new(H256::from_low_u64_be(0x1000 + n), 0),
        1_000 + n,
        key,
        kind,
    )
}

/// Escrow invoice as the indexer would have built it from its creation event
pub fn escrow_invoice(chain: ChainId, address: Address, values: &[u64]) -> Invoice {
    let key = InvoiceKey::new(chain, address);
    let created = event(
        key,
        0,
        EventKind::InvoiceCreated(CreationDetails {
            variant: InvoiceVariant::Escrow,
            client: CLIENT,
            provider: PROVIDER,
            resolver: Address::repeat_byte(0x03),
            token: TOKEN,
            amounts: values.iter().map(|v| U256::from(*v)).collect(),
            termination_time: u64::MAX,
            details: None,
            client_receiver: None,
            provider_receiver: None,
            instant: None,
        }),
    );
    apply_event(None, &created).unwrap()
}

/// Apply event number `n` of `kind` to `invoice`
pub fn with_event(invoice: &Invoice, n: u64, kind: EventKind) -> Invoice {
    apply_event(Some(invoice), &event(invoice.key, n, kind)).unwrap()
}

pub fn with_deposit(invoice: &Invoice, n: u64, amount: u64) -> Invoice {
    with_event(
        invoice,
        n,
        EventKind::Deposit {
            sender: CLIENT,
            amount: U256::from(amount),
        },
    )
}

pub fn summary(chain: ChainId, address: Address, created_at: u64) -> InvoiceSummary {
    let mut summary = escrow_invoice(chain, address, &[100]).summary();
    summary.created_at = created_at;
    summary
}
