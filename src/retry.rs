//! Per-message retry counters.
//!
//! Kept outside any session: a reconnect must not reset them.

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

pub const MAX_MESSAGE_RETRIES: u8 = 5;
const MAX_TRACKED_MESSAGES: u64 = 10_000;

/// Shared counter cache; clones share the same entries.
#[derive(Clone)]
pub struct MsgRetryCounterCache {
    counts: Cache<String, u8>,
    max_retries: u8,
}

impl Default for MsgRetryCounterCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MsgRetryCounterCache {
    /// `ttl` of `None` keeps counters until they are reset explicitly.
    pub fn new(ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(MAX_TRACKED_MESSAGES);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            counts: builder.build(),
            max_retries: MAX_MESSAGE_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Atomically bumps the counter and returns the new value, or `None`
    /// once the limit has been reached.
    pub async fn increment(&self, message_id: &str) -> Option<u8> {
        let max = self.max_retries;
        let result = self
            .counts
            .entry_by_ref(message_id)
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry.map(|entry| entry.into_value()) {
                    Some(current) if current >= max => Op::Nop,
                    Some(current) => Op::Put(current + 1),
                    None => Op::Put(1_u8),
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                Some(entry.into_value())
            }
            CompResult::Unchanged(_) | CompResult::StillNone(_) | CompResult::Removed(_) => None,
        }
    }

    pub async fn get(&self, message_id: &str) -> u8 {
        self.counts.get(message_id).await.unwrap_or(0)
    }

    pub async fn reset(&self, message_id: &str) {
        self.counts.invalidate(message_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_at_the_limit() {
        let cache = MsgRetryCounterCache::new(None).with_max_retries(2);
        assert_eq!(cache.increment("A").await, Some(1));
        assert_eq!(cache.increment("A").await, Some(2));
        assert_eq!(cache.increment("A").await, None);
        assert_eq!(cache.get("A").await, 2);
        assert_eq!(cache.get("B").await, 0);
    }

    #[tokio::test]
    async fn clones_share_counts_and_reset_clears() {
        let cache = MsgRetryCounterCache::default();
        let other = cache.clone();
        cache.increment("A").await;
        assert_eq!(other.increment("A").await, Some(2));

        other.reset("A").await;
        assert_eq!(cache.get("A").await, 0);
    }
}
