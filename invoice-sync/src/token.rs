// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain::ChainReader;
use ethers::types::Address;
use invoice_types::{ChainId, TokenMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Per-(chain, token) ERC20 metadata, read once and kept for the process
/// lifetime. Token metadata is immutable in practice.
pub struct TokenMetadataCache {
    reader: Arc<dyn ChainReader>,
    entries: RwLock<HashMap<(ChainId, Address), TokenMetadata>>,
}

impl TokenMetadataCache {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self {
            reader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Metadata for `token`, or `None` when the contract cannot be read. A
    /// later call reads the contract again.
    pub async fn lookup(&self, chain: ChainId, token: Address) -> Option<TokenMetadata> {
        if let Some(metadata) = self.entries.read().await.get(&(chain, token)) {
            return Some(metadata.clone());
        }
        match self.reader.erc20_metadata(chain, token).await {
            Ok(metadata) => {
                self.entries
                    .write()
                    .await
                    .insert((chain, token), metadata.clone());
                Some(metadata)
            }
            Err(e) => {
                warn!(
                    "[Token] Failed to read metadata of {:?} on chain {}: {}",
                    token, chain, e
                );
                None
            }
        }
    }

    /// Seed an entry, e.g. from metadata the indexer already returned
    pub async fn insert(&self, chain: ChainId, metadata: TokenMetadata) {
        self.entries
            .write()
            .await
            .insert((chain, metadata.address), metadata);
    }
}
