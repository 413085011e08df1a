// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Identifiers shared by every layer: chain ids, invoice keys and event ids.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: ChainId = ChainId(1);
    pub const OPTIMISM: ChainId = ChainId(10);
    pub const GNOSIS: ChainId = ChainId(100);
    pub const POLYGON: ChainId = ChainId(137);
    pub const BASE: ChainId = ChainId(8453);
    pub const ARBITRUM: ChainId = ChainId(42161);
    pub const SEPOLIA: ChainId = ChainId(11155111);
    /// Hardhat/Anvil default chain ID
    pub const LOCAL: ChainId = ChainId(31337);

    /// Network label used by the indexer's `network` field.
    ///
    /// Unknown chain ids get a synthetic `chain-<id>` label instead of failing,
    /// since new deployments show up in configuration before they show up here.
    pub fn network(&self) -> String {
        match self.0 {
            1 => "mainnet".to_string(),
            10 => "optimism".to_string(),
            100 => "xdai".to_string(),
            137 => "matic".to_string(),
            8453 => "base".to_string(),
            42161 => "arbitrum-one".to_string(),
            11155111 => "sepolia".to_string(),
            31337 => "local".to_string(),
            other => format!("chain-{}", other),
        }
    }

    /// Inverse of [`ChainId::network`]
    pub fn from_network(label: &str) -> Option<ChainId> {
        let chain = match label {
            "mainnet" => ChainId::MAINNET,
            "optimism" => ChainId::OPTIMISM,
            "xdai" | "gnosis" => ChainId::GNOSIS,
            "matic" | "polygon" => ChainId::POLYGON,
            "base" => ChainId::BASE,
            "arbitrum-one" => ChainId::ARBITRUM,
            "sepolia" => ChainId::SEPOLIA,
            "local" => ChainId::LOCAL,
            other => return other.strip_prefix("chain-")?.parse().ok().map(ChainId),
        };
        Some(chain)
    }

    pub fn is_local(&self) -> bool {
        *self == ChainId::LOCAL
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(v: u64) -> Self {
        ChainId(v)
    }
}

/// Globally unique identity of an invoice: the contract address on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvoiceKey {
    pub chain_id: ChainId,
    pub address: Address,
}

impl InvoiceKey {
    pub fn new(chain_id: ChainId, address: Address) -> Self {
        Self { chain_id, address }
    }

    /// Entity id used by the indexer (lowercase 0x-prefixed address)
    pub fn entity_id(&self) -> String {
        format_address(&self.address)
    }
}

impl fmt::Display for InvoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, format_address(&self.address))
    }
}

/// Position of a log in the chain; the idempotency key of every applied event.
///
/// One transaction may emit several events for the same invoice (a multi
/// milestone release emits one `Release` per milestone), so the log index is
/// part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub tx_hash: H256,
    pub log_index: u64,
}

impl EventId {
    pub fn new(tx_hash: H256, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-{}", self.tx_hash, self.log_index)
    }
}

/// Full lowercase hex form of an address (`Display` on `H160` abbreviates).
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_network_labels() {
        assert_eq!(ChainId::MAINNET.network(), "mainnet");
        assert_eq!(ChainId::GNOSIS.network(), "xdai");
        assert_eq!(ChainId::POLYGON.network(), "matic");
        assert_eq!(ChainId::SEPOLIA.network(), "sepolia");
    }

    #[test]
    fn test_unknown_chain_does_not_panic() {
        assert_eq!(ChainId(99999).network(), "chain-99999");
        assert!(!ChainId(99999).is_local());
        assert!(ChainId::LOCAL.is_local());
    }

    #[test]
    fn test_network_label_parses_back() {
        for chain in [ChainId::MAINNET, ChainId::GNOSIS, ChainId::ARBITRUM, ChainId(424242)] {
            assert_eq!(ChainId::from_network(&chain.network()), Some(chain));
        }
        assert_eq!(ChainId::from_network("gnosis"), Some(ChainId::GNOSIS));
        assert_eq!(ChainId::from_network("ropsten"), None);
        assert_eq!(ChainId::from_network("chain-x"), None);
    }

    #[test]
    fn test_invoice_key_display_uses_full_address() {
        let key = InvoiceKey::new(ChainId(1), Address::repeat_byte(0xaa));
        assert_eq!(
            key.to_string(),
            "1:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(key.entity_id(), "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_event_id_ordering_within_tx() {
        let tx = H256::repeat_byte(1);
        assert!(EventId::new(tx, 0) < EventId::new(tx, 1));
        assert_ne!(EventId::new(tx, 0), EventId::new(tx, 1));
    }

    #[test]
    fn test_chain_id_serializes_as_number() {
        let key = InvoiceKey::new(ChainId::GNOSIS, Address::repeat_byte(0x01));
        let json = serde_json::to_value(key).unwrap();
        assert_eq!(json["chain_id"], serde_json::json!(100));
        let back: InvoiceKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }
}
