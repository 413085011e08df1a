// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use invoice_types::{ChainId, InvoiceKey};
use thiserror::Error;

pub type IndexerResult<T> = Result<T, IndexerError>;
pub type ChainReadResult<T> = Result<T, ChainReadError>;
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    /// Connection refused, reset or timed out
    #[error("indexer transport error: {0}")]
    Transport(String),
    #[error("indexer returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("indexer query failed: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("failed to decode indexer response: {0}")]
    Decode(String),
    #[error("no indexer configured for chain {0}")]
    UnknownChain(ChainId),
}

impl IndexerError {
    /// Returns a short string identifying the error for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            IndexerError::Transport(_) => "transport",
            IndexerError::Http { .. } => "http",
            IndexerError::GraphQl(_) => "graphql",
            IndexerError::Decode(_) => "decode",
            IndexerError::UnknownChain(_) => "unknown_chain",
        }
    }

    /// Whether another attempt (possibly on another endpoint) can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexerError::Transport(_) => true,
            IndexerError::Http { status, .. } => *status == 429 || *status >= 500,
            IndexerError::GraphQl(_) | IndexerError::Decode(_) | IndexerError::UnknownChain(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainReadError {
    #[error("no RPC endpoint configured for chain {0}")]
    UnknownChain(ChainId),
    #[error("invalid RPC url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("RPC provider error: {0}")]
    Provider(String),
    #[error("contract call {call} failed: {reason}")]
    Contract { call: &'static str, reason: String },
}

impl ChainReadError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ChainReadError::UnknownChain(_) => "unknown_chain",
            ChainReadError::InvalidUrl { .. } => "invalid_url",
            ChainReadError::Provider(_) => "provider",
            ChainReadError::Contract { .. } => "contract",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Indexer(#[from] IndexerError),
    #[error(transparent)]
    ChainRead(#[from] ChainReadError),
    /// The indexer has not caught up with the invoice's creation yet
    #[error("invoice {0} is not indexed yet")]
    NotIndexed(InvoiceKey),
    #[error("chain {0} is not configured")]
    UnknownChain(ChainId),
}

impl ServiceError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::Indexer(e) => e.error_type(),
            ServiceError::ChainRead(e) => e.error_type(),
            ServiceError::NotIndexed(_) => "not_indexed",
            ServiceError::UnknownChain(_) => "unknown_chain",
        }
    }
}
