// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded polling until the indexer reflects an expected state.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(20_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Call `fetch` right away and then once per interval until `is_satisfied`
/// accepts a value, which is returned. Returns `None` once `options.timeout`
/// has elapsed.
///
/// Fetch errors are logged and the loop keeps going. At most one fetch is in
/// flight, and nothing is fetched after this function returns.
pub async fn wait_for<T, E, F, Fut, P>(
    label: &str,
    mut fetch: F,
    mut is_satisfied: P,
    options: PollOptions,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: FnMut(&T) -> bool,
{
    let poll = async {
        let mut interval = time::interval(options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;
        loop {
            interval.tick().await;
            attempt += 1;
            match fetch().await {
                Ok(value) if is_satisfied(&value) => {
                    debug!("[Poller] {} satisfied after {} attempt(s)", label, attempt);
                    return value;
                }
                Ok(_) => debug!("[Poller] {} not yet satisfied (attempt {})", label, attempt),
                Err(e) => warn!("[Poller] {} fetch failed (attempt {}): {}", label, attempt, e),
            }
        }
    };

    match time::timeout(options.timeout, poll).await {
        Ok(value) => Some(value),
        Err(_) => {
            info!(
                "[Poller] {} not satisfied within {:?}, giving up",
                label, options.timeout
            );
            None
        }
    }
}
