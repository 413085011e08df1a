// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Subgraph entity shapes and their conversion into domain types.
//!
//! The subgraph encodes `BigInt` as decimal strings and `Bytes` as 0x-prefixed
//! hex. Nested event entities have ids of the form `<txHash>-<logIndex>`.

use crate::error::{IndexerError, IndexerResult};
use ethers::types::{Address, H256, U256};
use invoice_types::{
    format_address, ChainId, Deposit, Dispute, EventId, InstantTerms, Invoice, InvoiceKey,
    InvoiceSummary, InvoiceVariant, MilestonesAdded, Release, Resolution, Tip, TokenMetadata,
    Withdraw,
};
use serde::Deserialize;
use std::str::FromStr;

use super::SyncStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct InvoiceResponse {
    pub invoice: Option<InvoiceRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InvoicesResponse {
    pub invoices: Vec<InvoiceSummaryRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetaResponse {
    #[serde(rename = "_meta")]
    pub meta: MetaRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetaRecord {
    pub block: MetaBlock,
    pub has_indexing_errors: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetaBlock {
    pub number: u64,
}

impl From<MetaRecord> for SyncStatus {
    fn from(meta: MetaRecord) -> Self {
        SyncStatus {
            has_indexing_errors: meta.has_indexing_errors,
            synced_block_number: meta.block.number,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvoiceRecord {
    pub address: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub invoice_type: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub creation_tx_hash: Option<String>,
    pub client: String,
    pub provider: String,
    pub resolver: String,
    #[serde(default)]
    pub client_receiver: Option<String>,
    #[serde(default)]
    pub provider_receiver: Option<String>,
    pub token: String,
    #[serde(default)]
    pub details: Option<String>,
    pub amounts: Vec<String>,
    pub current_milestone: String,
    pub total: String,
    pub released: String,
    pub is_locked: bool,
    pub termination_time: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub late_fee: Option<String>,
    #[serde(default)]
    pub late_fee_time_interval: Option<String>,
    #[serde(default)]
    pub fulfilled: Option<bool>,
    #[serde(default)]
    pub amount_fulfilled: Option<String>,
    #[serde(default)]
    pub verified: Vec<VerifiedRecord>,
    #[serde(default)]
    pub deposits: Vec<DepositRecord>,
    #[serde(default)]
    pub withdraws: Vec<WithdrawRecord>,
    #[serde(default)]
    pub releases: Vec<ReleaseRecord>,
    #[serde(default)]
    pub disputes: Vec<DisputeRecord>,
    #[serde(default)]
    pub resolutions: Vec<ResolutionRecord>,
    #[serde(default)]
    pub milestones_added: Vec<MilestonesAddedRecord>,
    #[serde(default)]
    pub tips_made: Vec<TipRecord>,
    #[serde(default)]
    pub token_metadata: Option<TokenMetadataRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifiedRecord {
    pub client: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DepositRecord {
    pub id: String,
    pub tx_hash: String,
    pub sender: String,
    pub amount: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WithdrawRecord {
    pub id: String,
    pub tx_hash: String,
    pub amount: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReleaseRecord {
    pub id: String,
    pub tx_hash: String,
    pub milestone: String,
    pub amount: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DisputeRecord {
    pub id: String,
    pub tx_hash: String,
    pub ipfs_hash: String,
    pub sender: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub dispute_fee: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResolutionRecord {
    pub id: String,
    pub tx_hash: String,
    pub ipfs_hash: String,
    pub resolver: String,
    pub client_award: String,
    pub provider_award: String,
    pub resolution_fee: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MilestonesAddedRecord {
    pub id: String,
    pub tx_hash: String,
    pub milestones: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TipRecord {
    pub id: String,
    pub tx_hash: String,
    pub sender: String,
    pub amount: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenMetadataRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvoiceSummaryRecord {
    pub address: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub invoice_type: Option<String>,
    pub created_at: String,
    pub client: String,
    pub provider: String,
    pub token: String,
    pub amounts: Vec<String>,
    pub current_milestone: String,
    pub total: String,
    pub released: String,
    pub is_locked: bool,
    pub termination_time: String,
}

impl InvoiceSummaryRecord {
    /// `queried` is the chain whose indexer returned the row; the row's own
    /// `network` field wins when it names a known chain.
    pub fn into_summary(self, queried: ChainId) -> IndexerResult<InvoiceSummary> {
        let network = self
            .network
            .as_deref()
            .and_then(ChainId::from_network)
            .unwrap_or(queried);
        Ok(InvoiceSummary {
            network,
            address: parse_address("address", &self.address)?,
            variant: parse_variant(self.invoice_type.as_deref())?,
            client: parse_address("client", &self.client)?,
            provider: parse_address("provider", &self.provider)?,
            token: parse_address("token", &self.token)?,
            total: parse_u256("total", &self.total)?,
            released: parse_u256("released", &self.released)?,
            is_locked: self.is_locked,
            current_milestone: parse_u64("currentMilestone", &self.current_milestone)?,
            milestone_count: self.amounts.len() as u64,
            created_at: parse_u64("createdAt", &self.created_at)?,
            termination_time: parse_u64("terminationTime", &self.termination_time)?,
        })
    }
}

impl InvoiceRecord {
    pub fn into_invoice(self, chain: ChainId) -> IndexerResult<Invoice> {
        let address = parse_address("address", &self.address)?;
        let key = InvoiceKey::new(chain, address);
        let variant = parse_variant(self.invoice_type.as_deref())?;
        let resolver = parse_address("resolver", &self.resolver)?;
        let token = parse_address("token", &self.token)?;

        let amounts = self
            .amounts
            .iter()
            .map(|a| parse_u256("amounts", a))
            .collect::<IndexerResult<Vec<_>>>()?;

        let deposits = self
            .deposits
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Ok(Deposit {
                    id: parse_event_id(&d.id, &d.tx_hash, i)?,
                    sender: parse_address("deposit.sender", &d.sender)?,
                    amount: parse_u256("deposit.amount", &d.amount)?,
                    timestamp: parse_u64("deposit.timestamp", &d.timestamp)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let withdraws = self
            .withdraws
            .iter()
            .enumerate()
            .map(|(i, w)| {
                Ok(Withdraw {
                    id: parse_event_id(&w.id, &w.tx_hash, i)?,
                    amount: parse_u256("withdraw.amount", &w.amount)?,
                    timestamp: parse_u64("withdraw.timestamp", &w.timestamp)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let releases = self
            .releases
            .iter()
            .enumerate()
            .map(|(i, r)| {
                Ok(Release {
                    id: parse_event_id(&r.id, &r.tx_hash, i)?,
                    milestone: parse_u64("release.milestone", &r.milestone)?,
                    amount: parse_u256("release.amount", &r.amount)?,
                    timestamp: parse_u64("release.timestamp", &r.timestamp)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let disputes = self
            .disputes
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Ok(Dispute {
                    id: format!("{}-dispute-{}", format_address(&address), i),
                    invoice: address,
                    event: parse_event_id(&d.id, &d.tx_hash, i)?,
                    ipfs_hash: parse_h256("dispute.ipfsHash", &d.ipfs_hash)?,
                    timestamp: parse_u64("dispute.timestamp", &d.timestamp)?,
                    sender: parse_address("dispute.sender", &d.sender)?,
                    amount: None,
                    dispute_fee: d
                        .dispute_fee
                        .as_deref()
                        .map(|fee| parse_u256("dispute.disputeFee", fee))
                        .transpose()?,
                    reason: d.details.clone().unwrap_or_default(),
                    resolver,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let resolutions = self
            .resolutions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                // Disputes never overlap, so the i-th resolution closes the i-th dispute
                let dispute_id = disputes.get(i).map(|d| d.id.clone()).ok_or_else(|| {
                    IndexerError::Decode(format!("resolution {} of {} has no dispute", i, key))
                })?;
                Ok(Resolution {
                    id: format!("{}-resolution-{}", format_address(&address), i),
                    dispute_id,
                    invoice: address,
                    event: parse_event_id(&r.id, &r.tx_hash, i)?,
                    ipfs_hash: parse_h256("resolution.ipfsHash", &r.ipfs_hash)?,
                    timestamp: parse_u64("resolution.timestamp", &r.timestamp)?,
                    resolver: parse_address("resolution.resolver", &r.resolver)?,
                    client_award: parse_u256("resolution.clientAward", &r.client_award)?,
                    provider_award: parse_u256("resolution.providerAward", &r.provider_award)?,
                    resolution_fee: parse_u256("resolution.resolutionFee", &r.resolution_fee)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let milestones_added = self
            .milestones_added
            .iter()
            .enumerate()
            .map(|(i, m)| {
                Ok(MilestonesAdded {
                    id: parse_event_id(&m.id, &m.tx_hash, i)?,
                    amounts: m
                        .milestones
                        .iter()
                        .map(|a| parse_u256("milestonesAdded.milestones", a))
                        .collect::<IndexerResult<Vec<_>>>()?,
                    timestamp: parse_u64("milestonesAdded.timestamp", &m.timestamp)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let tips = self
            .tips_made
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Ok(Tip {
                    id: parse_event_id(&t.id, &t.tx_hash, i)?,
                    sender: parse_address("tip.sender", &t.sender)?,
                    amount: parse_u256("tip.amount", &t.amount)?,
                    timestamp: parse_u64("tip.timestamp", &t.timestamp)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        let verified = self
            .verified
            .iter()
            .map(|v| parse_address("verified.client", &v.client))
            .collect::<IndexerResult<Vec<_>>>()?;

        let instant = match variant {
            InvoiceVariant::Instant => Some(InstantTerms {
                deadline: parse_opt_u64("deadline", self.deadline.as_deref())?,
                late_fee: parse_opt_u256("lateFee", self.late_fee.as_deref())?,
                late_fee_time_interval: parse_opt_u64(
                    "lateFeeTimeInterval",
                    self.late_fee_time_interval.as_deref(),
                )?,
                fulfilled: self.fulfilled.unwrap_or(false),
                amount_fulfilled: parse_opt_u256(
                    "amountFulfilled",
                    self.amount_fulfilled.as_deref(),
                )?,
            }),
            _ => None,
        };

        let token_metadata = self
            .token_metadata
            .map(|m| {
                Ok::<_, IndexerError>(TokenMetadata {
                    address: parse_address("tokenMetadata.id", &m.id)?,
                    name: m.name,
                    symbol: m.symbol,
                    decimals: m.decimals,
                    total_supply: parse_u256("tokenMetadata.totalSupply", &m.total_supply)?,
                })
            })
            .transpose()?;

        Ok(Invoice {
            key,
            variant,
            network: self.network.unwrap_or_else(|| chain.network()),
            created_at: parse_u64("createdAt", &self.created_at)?,
            creation_tx_hash: self
                .creation_tx_hash
                .as_deref()
                .map(|h| parse_h256("creationTxHash", h))
                .transpose()?
                .unwrap_or_default(),
            client: parse_address("client", &self.client)?,
            provider: parse_address("provider", &self.provider)?,
            resolver,
            client_receiver: parse_opt_address("clientReceiver", self.client_receiver.as_deref())?,
            provider_receiver: parse_opt_address(
                "providerReceiver",
                self.provider_receiver.as_deref(),
            )?,
            token,
            token_metadata,
            details: parse_opt_h256("details", self.details.as_deref())?,
            amounts,
            current_milestone: parse_u64("currentMilestone", &self.current_milestone)?,
            total: parse_u256("total", &self.total)?,
            released: parse_u256("released", &self.released)?,
            is_locked: self.is_locked,
            termination_time: parse_u64("terminationTime", &self.termination_time)?,
            verified,
            deposits,
            withdraws,
            releases,
            disputes,
            resolutions,
            milestones_added,
            tips,
            instant,
        })
    }
}

fn decode_err(field: &str, value: &str, reason: impl std::fmt::Display) -> IndexerError {
    IndexerError::Decode(format!("{} = {:?}: {}", field, value, reason))
}

fn strip_hex(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

fn parse_variant(value: Option<&str>) -> IndexerResult<InvoiceVariant> {
    match value {
        None | Some("") => Ok(InvoiceVariant::Escrow),
        Some(v) => InvoiceVariant::from_str(v).map_err(|e| decode_err("invoiceType", v, e)),
    }
}

fn parse_address(field: &str, value: &str) -> IndexerResult<Address> {
    Address::from_str(strip_hex(value)).map_err(|e| decode_err(field, value, e))
}

fn parse_opt_address(field: &str, value: Option<&str>) -> IndexerResult<Option<Address>> {
    value.map(|v| parse_address(field, v)).transpose()
}

fn parse_h256(field: &str, value: &str) -> IndexerResult<H256> {
    H256::from_str(strip_hex(value)).map_err(|e| decode_err(field, value, e))
}

/// Empty byte strings (`0x`) decode to `None`
fn parse_opt_h256(field: &str, value: Option<&str>) -> IndexerResult<Option<H256>> {
    match value.map(strip_hex) {
        None | Some("") => Ok(None),
        Some(_) => value.map(|v| parse_h256(field, v)).transpose(),
    }
}

fn parse_u256(field: &str, value: &str) -> IndexerResult<U256> {
    U256::from_dec_str(value).map_err(|e| decode_err(field, value, format!("{:?}", e)))
}

fn parse_opt_u256(field: &str, value: Option<&str>) -> IndexerResult<U256> {
    value.map_or(Ok(U256::zero()), |v| parse_u256(field, v))
}

fn parse_u64(field: &str, value: &str) -> IndexerResult<u64> {
    value.parse().map_err(|e| decode_err(field, value, e))
}

fn parse_opt_u64(field: &str, value: Option<&str>) -> IndexerResult<u64> {
    value.map_or(Ok(0), |v| parse_u64(field, v))
}

/// Log index comes from the `<txHash>-<logIndex>` entity id; entities with
/// other id shapes fall back to their position in the list.
fn parse_event_id(id: &str, tx_hash: &str, position: usize) -> IndexerResult<EventId> {
    let tx_hash = parse_h256("txHash", tx_hash)?;
    let log_index = id
        .rsplit_once('-')
        .and_then(|(_, index)| index.parse::<u64>().ok())
        .unwrap_or(position as u64);
    Ok(EventId::new(tx_hash, log_index))
}
