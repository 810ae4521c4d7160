//! Required channels
//!
//! Admins pick channels that users must join before using the platform.
//! Membership is checked through a [`ChannelDirectory`]; a passed check is
//! trusted until the cache entry expires or the channel list changes.
//! Admins are never checked.

use crate::error::{CoreError, ExternalApiError, ValidationError};
use crate::models::{RequiredChannel, User};
use crate::permissions::AdminGate;
use crate::storage::{StorageError, StorageProvider};
use async_trait::async_trait;
use chrono::Utc;
use lazy_regex::regex_is_match;
use moka::future::Cache;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Audit tag for adding a required channel
pub const ACTION_ADD_CHANNEL: &str = "add_required_channel";
/// Audit tag for removing a required channel
pub const ACTION_REMOVE_CHANNEL: &str = "remove_required_channel";

const MEMBERSHIP_CACHE_MAX_SIZE: u64 = 100_000;

/// Channel as typed by an admin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Public username without `@`
    Username(String),
    /// Numeric chat id (`-100...`)
    ChatId(i64),
}

impl ChannelRef {
    /// Parse `@name`, `https://t.me/name` or a `-100...` chat id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedChannel`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let malformed = || ValidationError::MalformedChannel(raw.to_string());

        if raw.starts_with("-100") {
            return raw.parse().map(Self::ChatId).map_err(|_| malformed());
        }

        let name = raw
            .strip_prefix('@')
            .or_else(|| raw.strip_prefix("https://t.me/"))
            .or_else(|| raw.strip_prefix("http://t.me/"))
            .or_else(|| raw.strip_prefix("t.me/"))
            .ok_or_else(malformed)?
            .trim_end_matches('/');
        if regex_is_match!(r"^[A-Za-z][A-Za-z0-9_]{3,31}$", name) {
            Ok(Self::Username(name.to_string()))
        } else {
            Err(malformed())
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username(name) => write!(f, "@{name}"),
            Self::ChatId(id) => write!(f, "{id}"),
        }
    }
}

/// What Telegram reports about a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Chat id
    pub chat_id: i64,
    /// Title
    pub title: String,
    /// Public username, if any
    pub username: Option<String>,
}

/// Channel lookups against Telegram
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Look a channel up. `None` when it does not exist or the platform bot
    /// cannot see it.
    async fn resolve(&self, channel: &ChannelRef) -> Result<Option<ChannelInfo>, ExternalApiError>;
    /// Whether the user is a member (or admin) of the channel
    async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool, ExternalApiError>;
}

/// Required channels and membership checks
pub struct ChannelRegistry {
    storage: Arc<dyn StorageProvider>,
    directory: Arc<dyn ChannelDirectory>,
    gate: Arc<AdminGate>,
    verified: Cache<i64, ()>,
}

impl ChannelRegistry {
    /// Create a registry trusting a passed check for `membership_ttl`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        directory: Arc<dyn ChannelDirectory>,
        gate: Arc<AdminGate>,
        membership_ttl: Duration,
    ) -> Self {
        let verified = Cache::builder()
            .max_capacity(MEMBERSHIP_CACHE_MAX_SIZE)
            .time_to_live(membership_ttl)
            .build();
        Self {
            storage,
            directory,
            gate,
            verified,
        }
    }

    /// Channels users must join.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list(&self) -> Result<Vec<RequiredChannel>, StorageError> {
        self.storage.list_required_channels().await
    }

    /// Require a channel. Admins only.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, a validation error for
    /// malformed, unknown or already required channels, an external API
    /// error if Telegram is unreachable, and a persistence error if storage
    /// fails.
    pub async fn add(&self, actor: &User, raw: &str) -> Result<RequiredChannel, CoreError> {
        self.gate.authorize(actor, ACTION_ADD_CHANNEL).await?;
        let reference = ChannelRef::parse(raw)?;
        let info = self
            .directory
            .resolve(&reference)
            .await?
            .ok_or_else(|| ValidationError::ChannelNotFound(reference.to_string()))?;

        let channel = RequiredChannel {
            chat_id: info.chat_id,
            username: info.username,
            title: info.title,
            added_by: actor.id,
            added_at: Utc::now(),
        };
        match self.storage.insert_required_channel(&channel).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(ValidationError::DuplicateChannel(channel.title).into());
            }
            Err(e) => return Err(e.into()),
        }

        self.storage
            .record_admin_action(
                actor.id,
                ACTION_ADD_CHANNEL,
                Some(channel.chat_id),
                Some(channel.title.clone()),
            )
            .await?;
        self.verified.invalidate_all();
        info!(
            "Admin {} added required channel {} ({})",
            actor.id, channel.chat_id, channel.title
        );
        Ok(channel)
    }

    /// Stop requiring a channel. Admins only.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, a validation error if the
    /// channel is not required, and a persistence error if storage fails.
    pub async fn remove(&self, actor: &User, chat_id: i64) -> Result<(), CoreError> {
        self.gate.authorize(actor, ACTION_REMOVE_CHANNEL).await?;
        if !self.storage.delete_required_channel(chat_id).await? {
            return Err(ValidationError::ChannelNotRequired(chat_id).into());
        }
        self.storage
            .record_admin_action(actor.id, ACTION_REMOVE_CHANNEL, Some(chat_id), None)
            .await?;
        self.verified.invalidate_all();
        info!("Admin {} removed required channel {chat_id}", actor.id);
        Ok(())
    }

    /// Required channels the user has not joined.
    ///
    /// Admins always pass. A channel whose membership cannot be checked
    /// counts as joined.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel list cannot be loaded.
    pub async fn missing_for(&self, user: &User) -> Result<Vec<RequiredChannel>, StorageError> {
        if self.gate.is_admin(user) || self.verified.contains_key(&user.id) {
            return Ok(Vec::new());
        }

        let mut missing = Vec::new();
        for channel in self.list().await? {
            match self.directory.is_member(channel.chat_id, user.id).await {
                Ok(true) => {}
                Ok(false) => missing.push(channel),
                Err(e) => warn!(
                    "Membership of user {} in channel {} unknown, letting through: {e}",
                    user.id, channel.chat_id
                ),
            }
        }

        if missing.is_empty() {
            self.verified.insert(user.id, ()).await;
        } else {
            debug!("User {} has not joined {} channels", user.id, missing.len());
        }
        Ok(missing)
    }

    /// Forget a passed check and run it again ("I've joined").
    ///
    /// # Errors
    ///
    /// Returns an error if the channel list cannot be loaded.
    pub async fn recheck(&self, user: &User) -> Result<Vec<RequiredChannel>, StorageError> {
        self.verified.invalidate(&user.id).await;
        self.missing_for(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::storage::MockStorageProvider;
    use crate::testing::{mock_storage_audit_only, sample_channel, sample_user};
    use mockall::predicate::eq;
    use std::collections::HashSet;

    const OWNER: i64 = 1;

    fn registry(storage: MockStorageProvider, directory: MockChannelDirectory) -> ChannelRegistry {
        let storage: Arc<dyn StorageProvider> = Arc::new(storage);
        let gate = Arc::new(AdminGate::new(HashSet::from([OWNER]), storage.clone()));
        ChannelRegistry::new(
            storage,
            Arc::new(directory),
            gate,
            Duration::from_secs(60),
        )
    }

    fn news() -> ChannelInfo {
        ChannelInfo {
            chat_id: -100_500,
            title: "News".into(),
            username: Some("news_channel".into()),
        }
    }

    #[test]
    fn channel_references() {
        assert_eq!(
            ChannelRef::parse("@news_channel"),
            Ok(ChannelRef::Username("news_channel".into()))
        );
        assert_eq!(
            ChannelRef::parse(" https://t.me/news_channel/ "),
            Ok(ChannelRef::Username("news_channel".into()))
        );
        assert_eq!(
            ChannelRef::parse("-1001234567890"),
            Ok(ChannelRef::ChatId(-1_001_234_567_890))
        );
        for bad in ["news", "@a", "-100abc", "https://example.com/x", "12345"] {
            assert!(ChannelRef::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn add_resolves_stores_and_audits() {
        let mut storage = mock_storage_audit_only();
        storage
            .expect_insert_required_channel()
            .withf(|channel| channel.chat_id == -100_500 && channel.added_by == OWNER)
            .times(1)
            .returning(|_| Ok(()));
        let mut directory = MockChannelDirectory::new();
        directory
            .expect_resolve()
            .with(eq(ChannelRef::Username("news_channel".into())))
            .returning(|_| Ok(Some(news())));

        let channel = registry(storage, directory)
            .add(&sample_user(OWNER), "@news_channel")
            .await
            .expect("added");
        assert_eq!(channel.url().as_deref(), Some("https://t.me/news_channel"));
    }

    #[tokio::test]
    async fn unknown_and_duplicate_channels_are_rejected() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_insert_required_channel()
            .returning(|_| Err(StorageError::Conflict("UNIQUE".into())));
        let mut directory = MockChannelDirectory::new();
        directory.expect_resolve().returning(|reference| {
            Ok(match reference {
                ChannelRef::Username(name) if name == "ghost_channel" => None,
                _ => Some(news()),
            })
        });
        let registry = registry(storage, directory);
        let owner = sample_user(OWNER);

        assert!(matches!(
            registry.add(&owner, "@ghost_channel").await,
            Err(CoreError::Validation(ValidationError::ChannelNotFound(_)))
        ));
        assert!(matches!(
            registry.add(&owner, "@news_channel").await,
            Err(CoreError::Validation(ValidationError::DuplicateChannel(_)))
        ));
    }

    #[tokio::test]
    async fn non_admin_cannot_change_channels() {
        let mut storage = mock_storage_audit_only();
        storage.expect_delete_required_channel().never();
        let mut directory = MockChannelDirectory::new();
        directory.expect_resolve().never();
        let registry = registry(storage, directory);

        assert!(matches!(
            registry.add(&sample_user(9), "@news_channel").await,
            Err(CoreError::Permission(_))
        ));
        assert!(matches!(
            registry.remove(&sample_user(9), -100_500).await,
            Err(CoreError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn missing_channels_are_listed_and_passes_are_cached() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_list_required_channels()
            .returning(|| Ok(vec![sample_channel(-100_1), sample_channel(-100_2)]));
        let mut directory = MockChannelDirectory::new();
        directory
            .expect_is_member()
            .with(eq(-100_1), eq(7))
            .returning(|_, _| Ok(true));
        directory
            .expect_is_member()
            .with(eq(-100_2), eq(7))
            .returning(|_, _| Ok(false));
        directory
            .expect_is_member()
            .with(eq(-100_1), eq(8))
            .returning(|_, _| Ok(true));
        directory
            .expect_is_member()
            .with(eq(-100_2), eq(8))
            .times(1)
            .returning(|_, _| Ok(true));
        let registry = registry(storage, directory);

        let missing = registry.missing_for(&sample_user(7)).await.expect("check");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].chat_id, -100_2);

        assert!(registry.missing_for(&sample_user(8)).await.expect("check").is_empty());
        // second call is served from the cache
        assert!(registry.missing_for(&sample_user(8)).await.expect("check").is_empty());
    }

    #[tokio::test]
    async fn admins_and_unknown_membership_pass() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_list_required_channels()
            .returning(|| Ok(vec![sample_channel(-100_1)]));
        let mut directory = MockChannelDirectory::new();
        directory
            .expect_is_member()
            .returning(|_, _| Err(ExternalApiError::Telegram("chat not found".into())));
        let registry = registry(storage, directory);

        let mut admin = sample_user(5);
        admin.role = Role::Admin;
        assert!(registry.missing_for(&admin).await.expect("check").is_empty());
        assert!(registry.missing_for(&sample_user(OWNER)).await.expect("check").is_empty());
        assert!(registry.missing_for(&sample_user(9)).await.expect("check").is_empty());
    }

    #[tokio::test]
    async fn recheck_after_joining() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_list_required_channels()
            .returning(|| Ok(vec![sample_channel(-100_1)]));
        let mut directory = MockChannelDirectory::new();
        let mut seq = mockall::Sequence::new();
        directory
            .expect_is_member()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        directory
            .expect_is_member()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        let registry = registry(storage, directory);
        let user = sample_user(7);

        assert_eq!(registry.missing_for(&user).await.expect("check").len(), 1);
        assert!(registry.recheck(&user).await.expect("check").is_empty());
    }
}
