//! Telegram transport settings.

use config::ConfigError;
use constructor_core::config::CoreSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token of the platform bot.
    pub telegram_token: String,
    /// Comma-separated list of owner user IDs.
    #[serde(rename = "admin_user_ids")]
    pub admin_user_ids_str: Option<String>,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Platform settings shared across transport handlers.
    pub core: Arc<CoreSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(core: CoreSettings, telegram: TelegramSettings) -> Self {
        Self {
            core: Arc::new(core),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        constructor_core::config::build_config()?.try_deserialize()
    }

    /// Returns the set of owner user IDs.
    #[must_use]
    pub fn admin_user_ids(&self) -> HashSet<i64> {
        self.admin_user_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Cooldown period (seconds) between "Access denied" notices for the same user.
/// Default: 20 minutes.
pub const DENIAL_COOLDOWN_SECS: u64 = 1200;
/// Maximum denial cache capacity (number of entries).
pub const DENIAL_CACHE_MAX_SIZE: u64 = 10_000;

/// Get denial cooldown from env or default.
///
/// Environment variable: `DENIAL_COOLDOWN_SECS`.
#[must_use]
pub fn get_denial_cooldown() -> u64 {
    std::env::var("DENIAL_COOLDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DENIAL_COOLDOWN_SECS)
}

/// Get denial cache max size from env or default.
///
/// Environment variable: `DENIAL_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_denial_cache_max_size() -> u64 {
    std::env::var("DENIAL_CACHE_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DENIAL_CACHE_MAX_SIZE)
}
