// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! GraphQL-over-HTTP indexer client

use super::queries::{self, GraphQlRequest};
use super::records::{InvoiceResponse, InvoicesResponse, MetaResponse};
use super::{IndexerClient, PageRequest, SyncStatus};
use crate::config::ChainConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::failover::{FailoverConfig, FailoverUrls};
use crate::metrics::SyncMetrics;
use async_trait::async_trait;
use ethers::types::Address;
use invoice_types::{ChainId, Invoice, InvoiceSummary};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_TRANSPORT_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn shared_http_client() -> IndexerResult<reqwest::Client> {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    if let Some(client) = CLIENT.get() {
        return Ok(client.clone());
    }
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(16)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| IndexerError::Transport(format!("failed to build HTTP client: {}", e)))?;
    Ok(CLIENT.get_or_init(|| client).clone())
}

fn is_transient_transport_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }

    let msg = err.to_string().to_lowercase();
    msg.contains("connection closed")
        || msg.contains("connection reset")
        || msg.contains("broken pipe")
        || msg.contains("unexpected eof")
        || msg.contains("incomplete")
}

pub struct GraphQlIndexerClient {
    http_client: reqwest::Client,
    endpoints: HashMap<ChainId, FailoverUrls>,
    metrics: Arc<SyncMetrics>,
}

impl GraphQlIndexerClient {
    pub fn new(
        chains: &[ChainConfig],
        failover: FailoverConfig,
        metrics: Arc<SyncMetrics>,
    ) -> IndexerResult<Self> {
        let mut endpoints = HashMap::new();
        for chain in chains {
            let urls = FailoverUrls::new(chain.indexer_urls.clone(), failover.clone())
                .ok_or(IndexerError::UnknownChain(chain.chain_id))?;
            endpoints.insert(chain.chain_id, urls);
        }
        Ok(Self {
            http_client: shared_http_client()?,
            endpoints,
            metrics,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        chain: ChainId,
        request: GraphQlRequest<'_>,
    ) -> IndexerResult<T> {
        let endpoints = self
            .endpoints
            .get(&chain)
            .ok_or(IndexerError::UnknownChain(chain))?;
        let chain_label = chain.to_string();
        let op = request.operation_name;
        self.metrics
            .indexer_queries
            .with_label_values(&[&chain_label, op])
            .inc();
        let timer = self
            .metrics
            .indexer_queries_latency
            .with_label_values(&[&chain_label, op])
            .start_timer();

        let start_url = endpoints.current_url().to_string();
        let result = endpoints
            .with_failover(|url| self.post::<T>(url, &request))
            .await;
        timer.observe_duration();

        if endpoints.current_url() != start_url {
            self.metrics
                .indexer_failovers
                .with_label_values(&[&chain_label])
                .inc();
        }
        if let Err(e) = &result {
            self.metrics
                .indexer_query_errors
                .with_label_values(&[&chain_label, op, e.error_type()])
                .inc();
            warn!("[Indexer] {} on chain {} failed: {}", op, chain, e);
        }
        result
    }

    /// One request with transient transport retries
    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        request: &GraphQlRequest<'_>,
    ) -> IndexerResult<T> {
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.http_client.post(&url).json(request).send().await {
                Ok(response) => break response,
                Err(err) => {
                    if attempt < MAX_TRANSPORT_ATTEMPTS && is_transient_transport_error(&err) {
                        warn!(
                            "[Indexer] transport error calling {} (attempt {}/{}), retrying",
                            request.operation_name, attempt, MAX_TRANSPORT_ATTEMPTS
                        );
                        tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                        continue;
                    }
                    return Err(IndexerError::Transport(err.to_string()));
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;
        decode_response(&body)
    }
}

fn decode_response<T: DeserializeOwned>(body: &str) -> IndexerResult<T> {
    let response: GraphQlResponse<T> =
        serde_json::from_str(body).map_err(|e| IndexerError::Decode(e.to_string()))?;
    if !response.errors.is_empty() {
        return Err(IndexerError::GraphQl(
            response.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    response
        .data
        .ok_or_else(|| IndexerError::Decode("response has neither data nor errors".to_string()))
}

#[async_trait]
impl IndexerClient for GraphQlIndexerClient {
    async fn fetch_one(&self, chain: ChainId, address: Address) -> IndexerResult<Option<Invoice>> {
        let response: InvoiceResponse = self
            .query(chain, queries::invoice_details(address))
            .await?;
        let invoice = response
            .invoice
            .map(|record| record.into_invoice(chain))
            .transpose()?;
        if invoice.is_none() {
            debug!("[Indexer] invoice {:?} not indexed on chain {}", address, chain);
        }
        Ok(invoice)
    }

    async fn fetch_page(
        &self,
        chain: ChainId,
        owner: Address,
        page: PageRequest,
    ) -> IndexerResult<Vec<InvoiceSummary>> {
        let response: InvoicesResponse = self
            .query(chain, queries::invoice_page(owner, &page))
            .await?;
        let rows = response
            .invoices
            .into_iter()
            .map(|record| record.into_summary(chain))
            .collect::<IndexerResult<Vec<_>>>()?;
        debug!(
            "[Indexer] page {} for {:?} on chain {}: {} rows",
            page.page,
            owner,
            chain,
            rows.len()
        );
        Ok(rows)
    }

    async fn sync_status(&self, chain: ChainId) -> IndexerResult<SyncStatus> {
        let response: MetaResponse = self.query(chain, queries::sync_status()).await?;
        Ok(response.meta.into())
    }
}
