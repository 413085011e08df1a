// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Live on-chain reads: head block, token balances and ERC20 metadata.

use crate::config::ChainConfig;
use crate::error::{ChainReadError, ChainReadResult};
use crate::metrics::SyncMetrics;
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use invoice_types::{ChainId, TokenMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

abigen!(
    EthERC20,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_block_number(&self, chain: ChainId) -> ChainReadResult<u64>;

    /// ERC20 balance of `holder`
    async fn token_balance(
        &self,
        chain: ChainId,
        token: Address,
        holder: Address,
    ) -> ChainReadResult<U256>;

    async fn erc20_metadata(&self, chain: ChainId, token: Address)
        -> ChainReadResult<TokenMetadata>;
}

/// [`ChainReader`] over one ethers HTTP provider per chain
pub struct EthChainReader {
    providers: HashMap<ChainId, Arc<Provider<Http>>>,
    metrics: Arc<SyncMetrics>,
}

impl EthChainReader {
    /// Chains without an `rpc_url` are skipped; reads on them fail with
    /// [`ChainReadError::UnknownChain`].
    pub fn new(chains: &[ChainConfig], metrics: Arc<SyncMetrics>) -> ChainReadResult<Self> {
        let mut providers = HashMap::new();
        for chain in chains {
            let Some(url) = chain.rpc_url.as_deref() else {
                warn!(
                    "[ChainReader] No rpc_url for chain {}, live reads disabled",
                    chain.name()
                );
                continue;
            };
            let provider =
                Provider::<Http>::try_from(url).map_err(|e| ChainReadError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            providers.insert(chain.chain_id, Arc::new(provider));
        }
        Ok(Self { providers, metrics })
    }

    fn provider(&self, chain: ChainId) -> ChainReadResult<Arc<Provider<Http>>> {
        self.providers
            .get(&chain)
            .cloned()
            .ok_or(ChainReadError::UnknownChain(chain))
    }

    fn record<T>(&self, chain: ChainId, call: &str, result: &ChainReadResult<T>) {
        let chain_label = chain.to_string();
        self.metrics
            .chain_reads
            .with_label_values(&[&chain_label, call])
            .inc();
        if let Err(e) = result {
            self.metrics
                .chain_read_errors
                .with_label_values(&[&chain_label, call])
                .inc();
            warn!("[ChainReader] {} on chain {} failed: {}", call, chain, e);
        }
    }
}

fn contract_err(
    call: &'static str,
) -> impl Fn(ethers::contract::ContractError<Provider<Http>>) -> ChainReadError {
    move |e| ChainReadError::Contract {
        call,
        reason: e.to_string(),
    }
}

/// Only `decimals` is required. Tokens with a non-string `name()` or
/// `symbol()` (bytes32 style) still report their real decimals.
fn assemble_metadata(
    token: Address,
    name: ChainReadResult<String>,
    symbol: ChainReadResult<String>,
    decimals: ChainReadResult<u8>,
    total_supply: ChainReadResult<U256>,
) -> ChainReadResult<TokenMetadata> {
    let decimals = decimals?;
    let name = name.unwrap_or_else(|e| {
        debug!("[ChainReader] token {:?} has no readable name: {}", token, e);
        String::new()
    });
    let symbol = symbol.unwrap_or_else(|e| {
        debug!("[ChainReader] token {:?} has no readable symbol: {}", token, e);
        String::new()
    });
    let total_supply = total_supply.unwrap_or_else(|e| {
        debug!("[ChainReader] token {:?} has no readable totalSupply: {}", token, e);
        U256::zero()
    });
    Ok(TokenMetadata {
        address: token,
        name,
        symbol,
        decimals,
        total_supply,
    })
}

#[async_trait]
impl ChainReader for EthChainReader {
    async fn latest_block_number(&self, chain: ChainId) -> ChainReadResult<u64> {
        let result = match self.provider(chain) {
            Ok(provider) => provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(|e| ChainReadError::Provider(e.to_string())),
            Err(e) => Err(e),
        };
        self.record(chain, "block_number", &result);
        result
    }

    async fn token_balance(
        &self,
        chain: ChainId,
        token: Address,
        holder: Address,
    ) -> ChainReadResult<U256> {
        let result = match self.provider(chain) {
            Ok(provider) => EthERC20::new(token, provider)
                .balance_of(holder)
                .call()
                .await
                .map_err(contract_err("balanceOf")),
            Err(e) => Err(e),
        };
        self.record(chain, "balance_of", &result);
        result
    }

    async fn erc20_metadata(
        &self,
        chain: ChainId,
        token: Address,
    ) -> ChainReadResult<TokenMetadata> {
        let provider = self.provider(chain)?;
        let erc20 = EthERC20::new(token, provider);
        let name = erc20.name();
        let symbol = erc20.symbol();
        let decimals = erc20.decimals();
        let total_supply = erc20.total_supply();
        let (name, symbol, decimals, total_supply) = tokio::join!(
            async { name.call().await.map_err(contract_err("name")) },
            async { symbol.call().await.map_err(contract_err("symbol")) },
            async { decimals.call().await.map_err(contract_err("decimals")) },
            async { total_supply.call().await.map_err(contract_err("totalSupply")) },
        );
        let result = assemble_metadata(token, name, symbol, decimals, total_supply);
        self.record(chain, "erc20_metadata", &result);
        if let Ok(metadata) = &result {
            debug!(
                "[ChainReader] token {:?} on chain {}: {} ({} decimals)",
                token, chain, metadata.symbol, metadata.decimals
            );
        }
        result
    }
}
