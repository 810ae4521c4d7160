//! Configuration and settings management
//!
//! Loads platform settings from config files and environment variables and
//! defines tuning constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum retries for Telegram API calls outside of broadcasts
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries (milliseconds)
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single Telegram API retry delay (milliseconds)
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Upper bound for conversation sessions kept in memory
pub const SESSION_CACHE_MAX_SIZE: u64 = 100_000;

/// Longest hosting extension an admin can grant at once (days)
pub const MAX_EXTENSION_DAYS: u32 = 365;

/// Bots shown on one page of the admin bot list
pub const BOTS_PER_PAGE: u32 = 10;

/// Platform settings shared by the core components
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreSettings {
    /// `SQLite` database location (`sqlite://path` or a plain file path)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// How many bots a single user may register
    #[serde(default = "default_max_bots_per_user")]
    pub max_bots_per_user: u32,

    /// Longest accepted broadcast body, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Maximum number of broadcast sends in flight
    #[serde(default = "default_broadcast_concurrency")]
    pub broadcast_concurrency: usize,

    /// Pause held by each broadcast send slot after a send (milliseconds)
    #[serde(default = "default_broadcast_delay_ms")]
    pub broadcast_delay_ms: u64,

    /// Per-recipient send timeout (seconds)
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Timeout for the bot token `getMe` check (seconds)
    #[serde(default = "default_token_validation_timeout_secs")]
    pub token_validation_timeout_secs: u64,

    /// Idle time after which an unfinished conversation is dropped (seconds)
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Users per page in the admin user list
    #[serde(default = "default_users_per_page")]
    pub users_per_page: u32,

    /// Hosting period of a newly registered bot (days)
    #[serde(default = "default_bot_lifetime_days")]
    pub bot_lifetime_days: u32,

    /// How often expired bots are stopped (seconds)
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    /// How long a passed channel membership check is trusted (seconds)
    #[serde(default = "default_membership_cache_secs")]
    pub membership_cache_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://constructor.db".to_string()
}

const fn default_max_bots_per_user() -> u32 {
    3
}

const fn default_max_message_length() -> usize {
    4000
}

const fn default_broadcast_concurrency() -> usize {
    10
}

const fn default_broadcast_delay_ms() -> u64 {
    50
}

const fn default_send_timeout_secs() -> u64 {
    30
}

const fn default_token_validation_timeout_secs() -> u64 {
    10
}

const fn default_session_idle_timeout_secs() -> u64 {
    900
}

const fn default_users_per_page() -> u32 {
    5
}

const fn default_bot_lifetime_days() -> u32 {
    30
}

const fn default_expiry_sweep_interval_secs() -> u64 {
    3600
}

const fn default_membership_cache_secs() -> u64 {
    300
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_bots_per_user: default_max_bots_per_user(),
            max_message_length: default_max_message_length(),
            broadcast_concurrency: default_broadcast_concurrency(),
            broadcast_delay_ms: default_broadcast_delay_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            token_validation_timeout_secs: default_token_validation_timeout_secs(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            users_per_page: default_users_per_page(),
            bot_lifetime_days: default_bot_lifetime_days(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            membership_cache_secs: default_membership_cache_secs(),
        }
    }
}

impl CoreSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Pause between broadcast sends
    #[must_use]
    pub const fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }

    /// Per-recipient send timeout
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Token validation timeout
    #[must_use]
    pub const fn token_validation_timeout(&self) -> Duration {
        Duration::from_secs(self.token_validation_timeout_secs)
    }

    /// Conversation idle timeout
    #[must_use]
    pub const fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Hosting period of a new bot
    #[must_use]
    pub fn bot_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.bot_lifetime_days))
    }

    /// Interval of the expiry sweep
    #[must_use]
    pub const fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    /// Lifetime of a cached membership check
    #[must_use]
    pub const fn membership_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_cache_secs)
    }
}

/// Build the layered configuration source used by every settings struct.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, `APP__*`
/// variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps to snake_case keys, empty vars count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}
