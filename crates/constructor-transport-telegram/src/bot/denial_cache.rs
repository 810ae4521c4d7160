//! Admin access denial flood protection
//!
//! Every denied `/admin` attempt is audited by the core gate; this cache only
//! throttles the notice shown in the chat.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Remembers when a user last saw the "Access denied" notice
#[derive(Clone)]
pub struct DenialCache {
    cache: Cache<i64, ()>,
    silenced_count: Arc<AtomicU64>,
}

impl DenialCache {
    /// Creates a cache that allows one notice per user every `cooldown_secs`.
    ///
    /// # Examples
    ///
    /// ```
    /// use constructor_transport_telegram::bot::DenialCache;
    ///
    /// // one notice every 20 minutes per user
    /// let _cache = DenialCache::new(1200, 10_000);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, max_capacity: u64) -> Self {
        let cooldown = Duration::from_secs(cooldown_secs);
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();

        Self {
            cache,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether the notice should be shown to this user now.
    ///
    /// Only every 100th silenced attempt is logged.
    pub async fn should_send(&self, user_id: i64) -> bool {
        if self.cache.get(&user_id).await.is_none() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!("Silenced {count} denied admin attempts (recent: user {user_id})");
        }
        false
    }

    /// Start the cooldown after a notice was delivered.
    pub async fn mark_sent(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }
}
