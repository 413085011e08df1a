// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Query surface used by the application: invoice details, multi-chain lists,
//! status and read-after-write synchronization, all served through one
//! [`AggregateCache`].

use crate::aggregator::{ChainAggregator, MultiChainPage};
use crate::cache::{AggregateCache, CacheKey};
use crate::chain::{ChainReader, EthChainReader};
use crate::config::SyncConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::failover::FailoverConfig;
use crate::health::{check_health, IndexerHealth};
use crate::indexer::{GraphQlIndexerClient, IndexerClient};
use crate::metrics::SyncMetrics;
use crate::mutation::{MutationKind, MutationSync, SyncOutcome};
use crate::token::TokenMetadataCache;
use anyhow::Context;
use ethers::types::Address;
use invoice_types::{
    derive_status, fold_events, ChainEvent, ChainId, Invoice, InvoiceKey, InvoiceStatus,
    MilestoneProgress, StatusInputs, TokenMetadata,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDetails {
    /// Aggregate with `token_metadata` filled in
    pub invoice: Invoice,
    pub token: TokenMetadata,
    /// False when the token could not be read and `token` is the 18-decimal
    /// fallback. Such details are served but not cached.
    pub token_resolved: bool,
    pub progress: MilestoneProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsState {
    /// The indexer has not seen the invoice yet
    Loading,
    Ready(Box<InvoiceDetails>),
}

impl DetailsState {
    pub fn ready(self) -> Option<InvoiceDetails> {
        match self {
            DetailsState::Ready(details) => Some(*details),
            DetailsState::Loading => None,
        }
    }
}

pub struct InvoiceService {
    indexer: Arc<dyn IndexerClient>,
    chain_reader: Arc<dyn ChainReader>,
    tokens: Arc<TokenMetadataCache>,
    aggregator: Arc<ChainAggregator>,
    mutations: MutationSync,
    cache: AggregateCache,
    chains: Vec<ChainId>,
    details_ttl: Duration,
    list_ttl: Duration,
    max_lag: u64,
    metrics: Arc<SyncMetrics>,
}

impl InvoiceService {
    pub fn new(
        config: &SyncConfig,
        indexer: Arc<dyn IndexerClient>,
        chain_reader: Arc<dyn ChainReader>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let cache = AggregateCache::with_metrics(metrics.clone())
            .with_max_entries(config.cache.max_entries);
        let chains = config.chain_ids();
        Self {
            tokens: Arc::new(TokenMetadataCache::new(chain_reader.clone())),
            aggregator: Arc::new(ChainAggregator::new(
                indexer.clone(),
                chains.clone(),
                config.page_size,
                metrics.clone(),
            )),
            mutations: MutationSync::new(
                indexer.clone(),
                cache.clone(),
                config.poller.options(),
                metrics.clone(),
            ),
            indexer,
            chain_reader,
            cache,
            chains,
            details_ttl: config.cache.details_ttl(),
            list_ttl: config.cache.list_ttl(),
            max_lag: config.health.max_lag,
            metrics,
        }
    }

    /// Service over the GraphQL indexer and ethers RPC providers of `config`
    pub fn from_config(config: &SyncConfig, metrics: Arc<SyncMetrics>) -> anyhow::Result<Self> {
        let indexer = GraphQlIndexerClient::new(
            &config.chains,
            FailoverConfig::from(&config.failover),
            metrics.clone(),
        )
        .context("Failed to create indexer client")?;
        let chain_reader = EthChainReader::new(&config.chains, metrics.clone())
            .context("Failed to create chain reader")?;
        Ok(Self::new(
            config,
            Arc::new(indexer),
            Arc::new(chain_reader),
            metrics,
        ))
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub fn chains(&self) -> &[ChainId] {
        &self.chains
    }

    fn ensure_chain(&self, chain: ChainId) -> ServiceResult<()> {
        if self.chains.contains(&chain) {
            Ok(())
        } else {
            Err(ServiceError::UnknownChain(chain))
        }
    }

    /// Invoice with token metadata and milestone progress.
    ///
    /// Token metadata returned by the indexer is used as is and seeds the
    /// token cache. Not-yet-indexed invoices are `Loading`, and details built
    /// on fallback token metadata are returned uncached, so the next call asks
    /// again.
    pub async fn get_invoice_details(
        &self,
        chain: ChainId,
        address: Address,
    ) -> ServiceResult<DetailsState> {
        self.ensure_chain(chain)?;
        let key = InvoiceKey::new(chain, address);
        let indexer = self.indexer.clone();
        let tokens = self.tokens.clone();
        let fetched = self
            .cache
            .get_or_fetch(
                CacheKey::invoice_details(&key),
                self.details_ttl,
                move || async move {
                    let mut invoice = indexer
                        .fetch_one(chain, address)
                        .await?
                        .ok_or(ServiceError::NotIndexed(key))?;
                    let (token, token_resolved) = match invoice.token_metadata.clone() {
                        Some(indexed) => {
                            tokens.insert(chain, indexed.clone()).await;
                            (indexed, true)
                        }
                        None => match tokens.lookup(chain, invoice.token).await {
                            Some(read) => (read, true),
                            None => (TokenMetadata::fallback(invoice.token), false),
                        },
                    };
                    invoice.token_metadata = Some(token.clone());
                    let progress = invoice.milestone_progress();
                    Ok::<_, ServiceError>(InvoiceDetails {
                        invoice,
                        token,
                        token_resolved,
                        progress,
                    })
                },
            )
            .await;

        match fetched {
            Ok(details) => {
                if !details.token_resolved {
                    self.cache.invalidate(&CacheKey::invoice_details(&key)).await;
                }
                Ok(DetailsState::Ready(Box::new(details)))
            }
            Err(ServiceError::NotIndexed(key)) => {
                debug!("[Service] {} not indexed yet", key);
                Ok(DetailsState::Loading)
            }
            Err(e) => Err(e),
        }
    }

    /// Page `page` of `owner`'s invoices across every chain.
    ///
    /// Partial pages are returned but not kept, so a failed chain is retried on
    /// the next call.
    pub async fn list_invoices(&self, owner: Address, page: u32) -> ServiceResult<MultiChainPage> {
        let key = CacheKey::invoices(&owner, page);
        let aggregator = self.aggregator.clone();
        let result = self
            .cache
            .get_or_fetch(key.clone(), self.list_ttl, move || async move {
                Ok::<_, ServiceError>(aggregator.list_invoices(owner, page).await)
            })
            .await?;
        if result.is_partial() {
            self.cache.invalidate(&key).await;
        }
        Ok(result)
    }

    /// Status of `invoice` now, using the live token balance of the contract
    /// for escrow invoices. Balance read failures are returned as errors.
    pub async fn get_invoice_status(&self, invoice: &Invoice) -> ServiceResult<InvoiceStatus> {
        self.get_invoice_status_at(invoice, unix_now()).await
    }

    pub async fn get_invoice_status_at(
        &self,
        invoice: &Invoice,
        now: u64,
    ) -> ServiceResult<InvoiceStatus> {
        let inputs = if invoice.variant.is_escrow_family() {
            let balance = self
                .chain_reader
                .token_balance(invoice.chain_id(), invoice.token, invoice.address())
                .await?;
            StatusInputs::with_balance(now, balance, now)
        } else {
            StatusInputs::at(now)
        };
        Ok(derive_status(invoice, &inputs))
    }

    /// Fold events decoded from a receipt onto `base` without waiting for the
    /// indexer. Rejected events are logged, counted and skipped.
    pub fn apply_events(&self, base: Option<Invoice>, events: &[ChainEvent]) -> Option<Invoice> {
        let outcome = fold_events(base, events);
        for (_, rejection) in &outcome.rejected {
            self.metrics
                .reducer_rejections
                .with_label_values(&[rejection.error_type()])
                .inc();
        }
        outcome.invoice
    }

    pub async fn after_mutation(&self, kind: MutationKind, before: &Invoice) -> SyncOutcome {
        self.mutations.after_mutation(kind, before).await
    }

    pub async fn wait_for_block(&self, chain: ChainId, block: u64) -> bool {
        self.mutations.wait_for_block(chain, block).await
    }

    /// Drop cached reads of one invoice and every cached list
    pub async fn invalidate_invoice(&self, chain: ChainId, address: Address) {
        let key = InvoiceKey::new(chain, address);
        self.cache.invalidate(&CacheKey::invoice_details(&key)).await;
        self.cache.invalidate(&CacheKey::all_invoices()).await;
    }

    pub async fn indexer_health(&self, chain: ChainId) -> ServiceResult<IndexerHealth> {
        self.ensure_chain(chain)?;
        check_health(
            self.indexer.as_ref(),
            self.chain_reader.as_ref(),
            chain,
            self.max_lag,
        )
        .await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::error::{ChainReadError, IndexerError};
    use crate::test_utils::*;
    use ethers::types::{H256, U256};
    use invoice_types::{format_address, EventId, EventKind, StatusLabel};

    const INVOICE: Address = Address::repeat_byte(0xaa);
    const OWNER: Address = Address::repeat_byte(0x01);

    fn config() -> SyncConfig {
        SyncConfig::from_yaml(
            r#"
chains:
  - chain_id: 1
    indexer_urls: ["http://indexer/mainnet"]
  - chain_id: 100
    label: gnosis
    indexer_urls: ["http://indexer/gnosis"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_builds_clients() {
        let mut config = config();
        config.chains[0].rpc_url = Some("http://127.0.0.1:8545".to_string());
        let chains: Vec<ChainConfig> = config.chains.clone();
        let service =
            InvoiceService::from_config(&config, Arc::new(SyncMetrics::new_for_testing()))
                .unwrap();
        assert_eq!(
            service.chains(),
            chains.iter().map(|c| c.chain_id).collect::<Vec<_>>().as_slice()
        );
    }

    fn service() -> (MockIndexerClient, MockChainReader, InvoiceService) {
        let indexer = MockIndexerClient::default();
        let reader = MockChainReader::default();
        let service = InvoiceService::new(
            &config(),
            Arc::new(indexer.clone()),
            Arc::new(reader.clone()),
            Arc::new(SyncMetrics::new_for_testing()),
        );
        (indexer, reader, service)
    }

    fn usdc() -> TokenMetadata {
        TokenMetadata {
            address: TOKEN,
            name: "USD Coin".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
            total_supply: U256::from(1_000_000u64),
        }
    }

    #[tokio::test]
    async fn test_details_filled_with_token_and_progress() {
        let (indexer, reader, service) = service();
        reader.set_metadata(ChainId::MAINNET, usdc());
        indexer.set_invoice(escrow_invoice(ChainId::MAINNET, INVOICE, &[100, 300]));

        let details = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(details.token.symbol, "USDC");
        assert_eq!(details.invoice.token_decimals(), 6);
        assert_eq!(details.progress.count, 2);
        assert_eq!(details.progress.total, U256::from(400));
    }

    #[tokio::test]
    async fn test_unreadable_token_details_not_cached() {
        let (indexer, reader, service) = service();
        indexer.set_invoice(escrow_invoice(ChainId::MAINNET, INVOICE, &[100]));

        let first = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(first.token.decimals, 18);
        assert!(!first.token_resolved);
        assert!(service.cache().is_empty().await);

        reader.set_metadata(ChainId::MAINNET, usdc());
        let second = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(second.token.decimals, 6);
        assert!(second.token_resolved);
        assert_eq!(reader.metadata_reads(), 2);
        assert_eq!(service.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_indexed_token_metadata_used_without_chain_read() {
        let (indexer, reader, service) = service();
        let mut invoice = escrow_invoice(ChainId::MAINNET, INVOICE, &[100]);
        invoice.token_metadata = Some(usdc());
        indexer.set_invoice(invoice);

        let details = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(details.token, usdc());
        assert!(details.token_resolved);
        assert_eq!(reader.metadata_reads(), 0);

        // Seeded: another invoice in the same token needs no read either
        let other = Address::repeat_byte(0xab);
        indexer.set_invoice(escrow_invoice(ChainId::MAINNET, other, &[100]));
        let details = service
            .get_invoice_details(ChainId::MAINNET, other)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(details.token.decimals, 6);
        assert_eq!(reader.metadata_reads(), 0);
    }

    #[tokio::test]
    async fn test_not_indexed_is_loading_and_not_cached() {
        let (indexer, _reader, service) = service();

        let state = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap();
        assert_eq!(state, DetailsState::Loading);
        assert!(service.cache().is_empty().await);

        indexer.set_invoice(escrow_invoice(ChainId::MAINNET, INVOICE, &[100]));
        let state = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap();
        assert!(matches!(state, DetailsState::Ready(_)));
        assert_eq!(indexer.fetch_one_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidated_details_fetched_fresh() {
        let (indexer, reader, service) = service();
        reader.set_metadata(ChainId::MAINNET, usdc());
        let invoice = escrow_invoice(ChainId::MAINNET, INVOICE, &[100]);
        indexer.set_invoice(invoice.clone());

        service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap();
        service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap();
        assert_eq!(indexer.fetch_one_calls(), 1);

        indexer.set_invoice(with_deposit(&invoice, 1, 100));
        service
            .cache()
            .invalidate(&CacheKey::new([
                "invoiceDetails".to_string(),
                "1".to_string(),
                format_address(&INVOICE),
            ]))
            .await;

        let details = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(indexer.fetch_one_calls(), 2);
        assert_eq!(details.invoice.deposits.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_chain_rejected() {
        let (_indexer, _reader, service) = service();
        let err = service
            .get_invoice_details(ChainId::POLYGON, INVOICE)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::UnknownChain(ChainId::POLYGON));
    }

    #[tokio::test]
    async fn test_indexer_error_surfaces() {
        let (indexer, _reader, service) = service();
        indexer.set_fetch_one_error(Some(IndexerError::GraphQl(vec!["bad query".to_string()])));
        let err = service
            .get_invoice_details(ChainId::MAINNET, INVOICE)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "graphql");
    }

    #[tokio::test]
    async fn test_list_cached_unless_partial() {
        let (indexer, _reader, service) = service();
        indexer.set_page(
            ChainId::MAINNET,
            vec![summary(ChainId::MAINNET, INVOICE, 100)],
        );

        let page = service.list_invoices(OWNER, 0).await.unwrap();
        assert_eq!(page.invoices.len(), 1);
        service.list_invoices(OWNER, 0).await.unwrap();
        assert_eq!(indexer.page_requests().len(), 2);

        indexer.set_page_error(
            ChainId::GNOSIS,
            IndexerError::Http {
                status: 503,
                body: String::new(),
            },
        );
        let page = service.list_invoices(OWNER, 1).await.unwrap();
        assert!(page.is_partial());
        service.list_invoices(OWNER, 1).await.unwrap();
        // Page 0 once, page 1 twice, two chains each
        assert_eq!(indexer.page_requests().len(), 6);
    }

    #[tokio::test]
    async fn test_invalidate_invoice_drops_lists() {
        let (indexer, _reader, service) = service();
        service.list_invoices(OWNER, 0).await.unwrap();
        service.invalidate_invoice(ChainId::MAINNET, INVOICE).await;
        service.list_invoices(OWNER, 0).await.unwrap();
        assert_eq!(indexer.page_requests().len(), 4);
    }

    #[tokio::test]
    async fn test_status_uses_live_balance() {
        let (_indexer, reader, service) = service();
        let invoice = with_deposit(
            &escrow_invoice(ChainId::MAINNET, INVOICE, &[100, 100]),
            1,
            50,
        );

        reader.set_balance(ChainId::MAINNET, TOKEN, INVOICE, 50);
        let status = service.get_invoice_status_at(&invoice, 2_000).await.unwrap();
        assert_eq!(status.label, StatusLabel::PartiallyFunded);
        assert!(status.funded);

        reader.set_balance(ChainId::MAINNET, TOKEN, INVOICE, 100);
        let status = service.get_invoice_status_at(&invoice, 2_000).await.unwrap();
        assert_eq!(status.label, StatusLabel::Funded);
    }

    #[tokio::test]
    async fn test_status_balance_failure_is_an_error() {
        let (_indexer, reader, service) = service();
        let invoice = escrow_invoice(ChainId::MAINNET, INVOICE, &[100]);
        let err = service
            .get_invoice_status_at(&invoice, 2_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::ChainRead(ChainReadError::Provider(_))
        ));
        assert_eq!(reader.balance_reads(), 1);
    }

    #[test]
    fn test_apply_events_counts_rejections() {
        let metrics = Arc::new(SyncMetrics::new_for_testing());
        let service = InvoiceService::new(
            &config(),
            Arc::new(MockIndexerClient::default()),
            Arc::new(MockChainReader::default()),
            metrics.clone(),
        );
        let invoice = escrow_invoice(ChainId::MAINNET, INVOICE, &[100]);
        let event = |n: u64, kind: EventKind| {
            ChainEvent::new(EventId::new(H256::from_low_u64_be(n), 0), 2_000, invoice.key, kind)
        };
        let events = [
            event(
                1,
                EventKind::Deposit {
                    sender: CLIENT,
                    amount: U256::from(100),
                },
            ),
            event(
                2,
                EventKind::Release {
                    milestone: 5,
                    amount: U256::from(100),
                },
            ),
        ];

        let applied = service.apply_events(Some(invoice.clone()), &events).unwrap();
        assert_eq!(applied.deposits.len(), 1);
        assert!(applied.releases.is_empty());
        assert_eq!(
            metrics
                .reducer_rejections
                .with_label_values(&["milestone_out_of_range"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_indexer_health_for_configured_chain() {
        let (indexer, reader, service) = service();
        indexer.set_sync_status(ChainId::GNOSIS, 950, false);
        reader.set_latest_block(ChainId::GNOSIS, 1_000);
        let health = service.indexer_health(ChainId::GNOSIS).await.unwrap();
        assert_eq!(health.lag, 50);
        assert!(!health.healthy);
    }
}
