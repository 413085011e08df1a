// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Aggregate cache with stale-while-revalidate
//!
//! Values are stored under hierarchical [`CacheKey`]s such as
//! `["invoiceDetails", "100", "0xabc.."]` and served by [`AggregateCache::get_or_fetch`]:
//! - fresh entry: served as is
//! - stale entry: served immediately, and one background refresh is started
//!   for the key (concurrent callers do not start another one)
//! - missing entry: fetched synchronously
//!
//! [`AggregateCache::invalidate`] drops every key under a prefix. A fetch that
//! was already running when its key got invalidated does not write its
//! result back, so an invalidation is never undone by an older read.
//!
//! Storing past `max_entries` first drops every stale entry, then the oldest
//! fresh ones.

use crate::metrics::SyncMetrics;
use ethers::types::Address;
use invoice_types::{format_address, InvoiceKey};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

const INVOICE_DETAILS: &str = "invoiceDetails";
const INVOICES: &str = "invoices";

pub const DEFAULT_MAX_ENTRIES: usize = 4_096;

/// Hierarchical cache key; prefixes select groups of keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// `["invoiceDetails", chain, address]`
    pub fn invoice_details(key: &InvoiceKey) -> Self {
        Self::new([
            INVOICE_DETAILS.to_string(),
            key.chain_id.to_string(),
            key.entity_id(),
        ])
    }

    /// `["invoices", owner, page]`
    pub fn invoices(owner: &Address, page: u32) -> Self {
        Self::new([INVOICES.to_string(), format_address(owner), page.to_string()])
    }

    /// Prefix of every cached invoice list
    pub fn all_invoices() -> Self {
        Self::new([INVOICES])
    }

    /// First segment, used as the query label in metrics
    pub fn query(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Share of lookups served from the cache, stale or not (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.stale_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.stale_hits) as f64 / total as f64
        }
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

#[derive(Default)]
struct Inner {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    /// Key -> ticket of the fetch allowed to write it. Invalidation removes
    /// the ticket, which turns the running fetch into a read-only one.
    in_flight: Mutex<HashMap<CacheKey, u64>>,
    next_ticket: AtomicU64,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
}

/// Shared handle; clones refer to the same storage
#[derive(Clone)]
pub struct AggregateCache {
    inner: Arc<Inner>,
    max_entries: usize,
    metrics: Option<Arc<SyncMetrics>>,
}

impl Default for AggregateCache {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            max_entries: DEFAULT_MAX_ENTRIES,
            metrics: None,
        }
    }
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<SyncMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Serve `key` from the cache, refreshing it with `fetcher` as needed.
    ///
    /// Only a synchronous fetch can return an error; background refresh
    /// failures are logged and keep the stale value.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetcher: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cached = {
            let entries = self.inner.entries.read().await;
            entries.get(&key).and_then(|entry| {
                let value = entry.value.clone().downcast::<T>().ok()?;
                Some((value, entry.is_fresh()))
            })
        };

        match cached {
            Some((value, true)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                self.count(&key, |m| &m.cache_hits);
                Ok(T::clone(&value))
            }
            Some((value, false)) => {
                self.inner.stale_hits.fetch_add(1, Ordering::Relaxed);
                self.count(&key, |m| &m.cache_stale_served);
                self.spawn_refresh(key, ttl, fetcher).await;
                Ok(T::clone(&value))
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                self.count(&key, |m| &m.cache_misses);
                let ticket = self.claim(&key).await;
                let result = fetcher().await;
                match &result {
                    Ok(value) => self.complete(&key, ticket, ttl, value.clone()).await,
                    Err(_) => self.release(&key, ticket).await,
                }
                result
            }
        }
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many
    /// entries were removed.
    pub async fn invalidate(&self, prefix: &CacheKey) -> usize {
        let mut in_flight = self.inner.in_flight.lock().await;
        in_flight.retain(|key, _| !key.starts_with(prefix));
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();

        if let Some(metrics) = &self.metrics {
            metrics
                .cache_invalidations
                .with_label_values(&[prefix.query()])
                .inc();
        }
        debug!("[Cache] Invalidated {} ({} entries)", prefix, removed);
        removed
    }

    /// Value currently stored under `key`, fresh or stale
    pub async fn peek<T: Clone + Send + Sync + 'static>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.inner.entries.read().await;
        let value = entries.get(key)?.value.clone().downcast::<T>().ok()?;
        Some(T::clone(&value))
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            stale_hits: self.inner.stale_hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    async fn spawn_refresh<T, E, F, Fut>(&self, key: CacheKey, ttl: Duration, fetcher: F)
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let ticket = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if in_flight.contains_key(&key) {
                debug!("[Cache] Refresh of {} already running", key);
                return;
            }
            let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
            in_flight.insert(key.clone(), ticket);
            ticket
        };

        let cache = self.clone();
        tokio::spawn(async move {
            match fetcher().await {
                Ok(value) => cache.complete(&key, ticket, ttl, value).await,
                Err(e) => {
                    warn!("[Cache] Background refresh of {} failed: {}", key, e);
                    cache.release(&key, ticket).await;
                }
            }
        });
    }

    /// Register a synchronous fetch. It supersedes any running refresh.
    async fn claim(&self, key: &CacheKey) -> u64 {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.inner
            .in_flight
            .lock()
            .await
            .insert(key.clone(), ticket);
        ticket
    }

    /// Store `value` if `ticket` still owns `key`
    async fn complete<T: Send + Sync + 'static>(
        &self,
        key: &CacheKey,
        ticket: u64,
        ttl: Duration,
        value: T,
    ) {
        let mut in_flight = self.inner.in_flight.lock().await;
        if in_flight.get(key) != Some(&ticket) {
            debug!("[Cache] Dropping result for {}: invalidated or superseded", key);
            return;
        }
        in_flight.remove(key);
        let mut entries = self.inner.entries.write().await;
        entries.insert(
            key.clone(),
            Entry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
                ttl,
            },
        );
        if entries.len() > self.max_entries {
            self.evict(&mut entries);
        }
    }

    fn evict(&self, entries: &mut HashMap<CacheKey, Entry>) {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh());
        if entries.len() > self.max_entries {
            let mut by_age: Vec<(Instant, CacheKey)> = entries
                .iter()
                .map(|(key, entry)| (entry.fetched_at, key.clone()))
                .collect();
            by_age.sort();
            let excess = entries.len() - self.max_entries;
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }
        debug!("[Cache] Evicted {} entries", before - entries.len());
    }

    async fn release(&self, key: &CacheKey, ticket: u64) {
        let mut in_flight = self.inner.in_flight.lock().await;
        if in_flight.get(key) == Some(&ticket) {
            in_flight.remove(key);
        }
    }

    fn count(
        &self,
        key: &CacheKey,
        counter: impl FnOnce(&SyncMetrics) -> &prometheus::IntCounterVec,
    ) {
        if let Some(metrics) = &self.metrics {
            counter(metrics).with_label_values(&[key.query()]).inc();
        }
    }
}
