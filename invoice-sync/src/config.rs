// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sync configuration

use anyhow::{bail, Context, Result};
use invoice_types::ChainId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::failover::FailoverConfig;
use crate::poller::PollOptions;

/// Complete sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub failover: FailoverSettings,
    /// Rows requested from each chain per list page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    10
}

impl SyncConfig {
    /// Load configuration from YAML file with environment variable substitution
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read sync config file: {:?}", path))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let contents = substitute_env_vars(contents)?;
        let config: SyncConfig =
            serde_yaml::from_str(&contents).context("Failed to parse sync config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            bail!("At least one chain must be configured");
        }
        for (i, chain) in self.chains.iter().enumerate() {
            if chain.indexer_urls.is_empty() {
                bail!("Chain {} has no indexer_urls", chain.chain_id);
            }
            if self.chains[..i].iter().any(|c| c.chain_id == chain.chain_id) {
                bail!("Chain {} is configured twice", chain.chain_id);
            }
            for url in chain.indexer_urls.iter().chain(chain.rpc_url.iter()) {
                Url::parse(url).with_context(|| {
                    format!("Chain {} has an invalid URL: {}", chain.chain_id, url)
                })?;
            }
        }
        if self.page_size == 0 {
            bail!("page_size must be positive");
        }
        Ok(())
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> Result<String> {
    use regex::Regex;

    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(var_value) = std::env::var(var_name) {
            result = result.replace(full_match, &var_value);
        } else {
            tracing::warn!(
                "Environment variable {} not found, keeping placeholder",
                var_name
            );
        }
    }

    Ok(result)
}

/// One indexed chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    #[serde(default)]
    pub label: Option<String>,
    /// GraphQL endpoints, first is primary
    pub indexer_urls: Vec<String>,
    /// JSON-RPC endpoint for live reads (balances, token metadata, head block)
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl ChainConfig {
    pub fn name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.chain_id.network())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_poll_timeout_ms() -> u64 {
    20_000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl PollerConfig {
    pub fn options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_details_ttl_secs")]
    pub details_ttl_secs: u64,
    #[serde(default = "default_list_ttl_secs")]
    pub list_ttl_secs: u64,
    /// Entry count past which stale, then oldest, entries are dropped
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_details_ttl_secs() -> u64 {
    15 * 60
}

fn default_list_ttl_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            details_ttl_secs: default_details_ttl_secs(),
            list_ttl_secs: default_list_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn details_ttl(&self) -> Duration {
        Duration::from_secs(self.details_ttl_secs)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Blocks the indexer may trail the chain head before it is unhealthy
    #[serde(default = "default_max_lag")]
    pub max_lag: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_max_lag() -> u64 {
    32
}

fn default_check_interval_secs() -> u64 {
    30
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_lag: default_max_lag(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverSettings {
    #[serde(default = "default_max_retries_per_url")]
    pub max_retries_per_url: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_max_retries_per_url() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            max_retries_per_url: default_max_retries_per_url(),
            retry_delay_ms: default_retry_delay_ms(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl From<&FailoverSettings> for FailoverConfig {
    fn from(settings: &FailoverSettings) -> Self {
        FailoverConfig {
            max_retries_per_url: settings.max_retries_per_url.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            cooldown_period: Duration::from_secs(settings.cooldown_secs),
        }
    }
}
