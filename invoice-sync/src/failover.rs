// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint failover for indexer queries
//!
//! Each chain can be served by several indexer deployments. Requests go to the
//! current endpoint and move on to the next one after repeated retryable
//! failures. A failed endpoint is skipped until its cooldown expires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

/// Errors that may succeed on a later attempt
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::error::IndexerError {
    fn is_retryable(&self) -> bool {
        crate::error::IndexerError::is_retryable(self)
    }
}

#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Attempts on one URL before failing over
    pub max_retries_per_url: u32,
    pub retry_delay: Duration,
    /// How long a failed URL is skipped
    pub cooldown_period: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retries_per_url: 2,
            retry_delay: Duration::from_millis(250),
            cooldown_period: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct FailoverUrls {
    urls: Vec<String>,
    current_index: AtomicUsize,
    failed_urls: RwLock<HashMap<usize, Instant>>,
    config: FailoverConfig,
}

impl FailoverUrls {
    /// Returns `None` when `urls` is empty
    pub fn new(urls: Vec<String>, config: FailoverConfig) -> Option<Self> {
        if urls.is_empty() {
            return None;
        }
        Some(Self {
            urls,
            current_index: AtomicUsize::new(0),
            failed_urls: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn current_url(&self) -> &str {
        let idx = self.current_index.load(Ordering::SeqCst);
        &self.urls[idx % self.urls.len()]
    }

    pub fn all_urls(&self) -> &[String] {
        &self.urls
    }

    /// Mark the current URL failed and move to the next one out of cooldown.
    /// Returns true if the current URL changed.
    pub async fn report_failure(&self) -> bool {
        let current = self.current_index.load(Ordering::SeqCst) % self.urls.len();
        let mut failed = self.failed_urls.write().await;
        failed.insert(current, Instant::now());

        if self.urls.len() == 1 {
            return false;
        }

        let candidate = (1..self.urls.len())
            .map(|offset| (current + offset) % self.urls.len())
            .find(|idx| {
                failed
                    .get(idx)
                    .map_or(true, |at| at.elapsed() >= self.config.cooldown_period)
            });

        let next = match candidate {
            Some(idx) => {
                warn!(
                    "[Failover] Switched from {} to {}",
                    self.urls[current], self.urls[idx]
                );
                idx
            }
            None => {
                let idx = (current + 1) % self.urls.len();
                warn!(
                    "[Failover] All URLs in cooldown, rotating to {}",
                    self.urls[idx]
                );
                idx
            }
        };
        self.current_index.store(next, Ordering::SeqCst);
        true
    }

    pub async fn report_success(&self) {
        let current = self.current_index.load(Ordering::SeqCst) % self.urls.len();
        let mut failed = self.failed_urls.write().await;
        failed.remove(&current);
    }

    /// Run `f` against the current URL, retrying and failing over on
    /// retryable errors. Non-retryable errors are returned immediately.
    pub async fn with_failover<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let retries = self.config.max_retries_per_url.max(1) as usize;
        let total_attempts = self.urls.len() * retries;
        let mut attempt = 0;

        loop {
            let url = self.current_url().to_string();
            match f(url.clone()).await {
                Ok(result) => {
                    self.report_success().await;
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt >= total_attempts {
                        return Err(e);
                    }
                    warn!(
                        "[Failover] Request failed on {} (attempt {}/{}): {}",
                        url, attempt, total_attempts, e
                    );
                    if attempt % retries == 0 {
                        self.report_failure().await;
                    } else {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
    }
}
