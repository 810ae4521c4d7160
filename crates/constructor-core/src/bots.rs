//! Hosted bot registry
//!
//! Users submit a bot token, the token is validated once against Telegram,
//! and the bot is then started and stopped through a [`BotSupervisor`].
//! Status changes follow [`BotStatus::can_transition_to`]. Every bot is
//! hosted for a limited period; admins can extend it and expired bots are
//! stopped by [`BotRegistry::expire_due`].

use crate::config::{CoreSettings, MAX_EXTENSION_DAYS};
use crate::error::{CoreError, ExternalApiError, ValidationError};
use crate::models::{BotStatus, BotSubmission, NewBot, User};
use crate::permissions::AdminGate;
use crate::storage::{StorageError, StorageProvider};
use crate::validator::{BotInfo, BotToken, TokenValidator};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Audit tag for hosting extensions
pub const ACTION_EXTEND_BOT: &str = "extend_bot_time";
/// Audit tag for an admin-triggered expiry sweep
pub const ACTION_EXPIRE_BOTS: &str = "expire_bots";

/// Parse an admin's `<bot id> <days>` extension request.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidExtension`] unless the input is two
/// integers with days between 1 and [`MAX_EXTENSION_DAYS`].
pub fn parse_extension(raw: &str) -> Result<(i64, u32), ValidationError> {
    let invalid = ValidationError::InvalidExtension {
        max_days: MAX_EXTENSION_DAYS,
    };
    let mut parts = raw.split_whitespace();
    let (Some(bot_id), Some(days), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid);
    };
    let bot_id = bot_id.parse().map_err(|_| invalid.clone())?;
    let days: u32 = days.parse().map_err(|_| invalid.clone())?;
    if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
        return Err(invalid);
    }
    Ok((bot_id, days))
}

/// Runtime that hosts the bots users created
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotSupervisor: Send + Sync {
    /// Start serving updates for `bot`. Starting a running bot is a no-op.
    async fn start(&self, bot: &BotSubmission) -> Result<(), ExternalApiError>;
    /// Stop serving updates for a bot. Stopping an idle bot is a no-op.
    async fn stop(&self, bot_id: i64) -> Result<(), ExternalApiError>;
}

/// Limits applied to every submission
#[derive(Debug, Clone)]
pub struct RegistryPolicy {
    /// Bots one user may register
    pub max_bots_per_user: u32,
    /// Hosting period of a new bot
    pub bot_lifetime: Duration,
    /// Bot id of the platform's own token, which can never be hosted
    pub platform_bot_id: Option<String>,
}

impl RegistryPolicy {
    /// Policy from the platform settings and the platform bot token.
    #[must_use]
    pub fn from_settings(settings: &CoreSettings, platform_token: &str) -> Self {
        let platform_bot_id = platform_token
            .split_once(':')
            .map(|(id, _)| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Self {
            max_bots_per_user: settings.max_bots_per_user,
            bot_lifetime: settings.bot_lifetime(),
            platform_bot_id,
        }
    }
}

/// Result of [`BotRegistry::resume_running`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResumeReport {
    /// Bots serving again
    pub started: usize,
    /// Bots that failed and were marked stopped
    pub failed: usize,
    /// Bots whose hosting period ended while the platform was down
    pub expired: usize,
}

/// Every hosted bot with expiry counters, for the admin bot list
#[derive(Debug, Clone)]
pub struct BotOverview {
    /// Bots on the requested page, newest first
    pub bots: Vec<BotSubmission>,
    /// Zero-based page index
    pub page: u32,
    /// Total number of pages (at least 1)
    pub total_pages: u32,
    /// All bots
    pub total: usize,
    /// Serving updates
    pub running: usize,
    /// Hosting period over
    pub expired: usize,
    /// Expiring within a week
    pub expiring_soon: usize,
}

/// Registry of hosted bots
pub struct BotRegistry {
    storage: Arc<dyn StorageProvider>,
    validator: Arc<dyn TokenValidator>,
    supervisor: Arc<dyn BotSupervisor>,
    gate: Arc<AdminGate>,
    policy: RegistryPolicy,
}

impl BotRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        validator: Arc<dyn TokenValidator>,
        supervisor: Arc<dyn BotSupervisor>,
        gate: Arc<AdminGate>,
        policy: RegistryPolicy,
    ) -> Self {
        Self {
            storage,
            validator,
            supervisor,
            gate,
            policy,
        }
    }

    /// Per-user bot limit.
    #[must_use]
    pub const fn max_bots_per_user(&self) -> u32 {
        self.policy.max_bots_per_user
    }

    /// Check a submitted token: shape, owner limit, duplicates, then `getMe`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for any rejected submission and a
    /// persistence error if storage fails.
    pub async fn validate_submission(
        &self,
        owner_id: i64,
        raw_token: &str,
    ) -> Result<(BotToken, BotInfo), CoreError> {
        let token = BotToken::parse(raw_token)?;
        self.check_capacity(owner_id, &token).await?;

        let info = self.validator.validate(&token).await?;
        info!("Token {token} validated as @{} for user {owner_id}", info.username);
        Ok((token, info))
    }

    /// Store a validated bot and start it.
    ///
    /// A start failure leaves the bot `Validated` so the owner can retry.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the limit was reached or the token was
    /// registered in the meantime, and a persistence error if storage fails.
    pub async fn register(
        &self,
        owner_id: i64,
        token: BotToken,
        info: BotInfo,
    ) -> Result<BotSubmission, CoreError> {
        self.check_capacity(owner_id, &token).await?;

        let new_bot = NewBot {
            owner_id,
            token,
            info,
            expires_at: Utc::now() + self.policy.bot_lifetime,
        };
        let mut bot = match self.storage.insert_bot(&new_bot, BotStatus::Pending).await {
            Ok(bot) => bot,
            Err(StorageError::Conflict(_)) => return Err(ValidationError::DuplicateBot.into()),
            Err(e) => return Err(e.into()),
        };
        self.transition(&mut bot, BotStatus::Validated).await?;

        if let Err(e) = self.launch_bot(&mut bot).await {
            warn!("Bot {} registered but failed to start: {e}", bot.id);
        }
        Ok(bot)
    }

    /// Bots owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<BotSubmission>, StorageError> {
        self.storage.list_bots_by_owner(owner_id).await
    }

    /// A bot, if it belongs to `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown or foreign bots.
    pub async fn get_owned(&self, owner_id: i64, bot_id: i64) -> Result<BotSubmission, CoreError> {
        let bot = self
            .storage
            .get_bot(bot_id)
            .await?
            .ok_or(ValidationError::BotNotFound(bot_id))?;
        if bot.owner_id != owner_id {
            return Err(ValidationError::NotBotOwner(bot_id).into());
        }
        Ok(bot)
    }

    /// Start a stopped bot or stop a running one.
    ///
    /// # Errors
    ///
    /// Returns a validation error for foreign bots or pending ones, an
    /// external API error if the runtime refuses, and a persistence error if
    /// storage fails.
    pub async fn toggle(&self, owner_id: i64, bot_id: i64) -> Result<BotSubmission, CoreError> {
        let mut bot = self.get_owned(owner_id, bot_id).await?;
        match bot.status {
            BotStatus::Running => {
                self.supervisor.stop(bot.id).await?;
                self.transition(&mut bot, BotStatus::Stopped).await?;
                info!("Bot {} stopped by owner {owner_id}", bot.id);
            }
            BotStatus::Validated | BotStatus::Stopped => {
                self.launch_bot(&mut bot).await?;
                info!("Bot {} started by owner {owner_id}", bot.id);
            }
            BotStatus::Pending => {
                return Err(ValidationError::InvalidStatusTransition {
                    from: BotStatus::Pending,
                    to: BotStatus::Running,
                }
                .into());
            }
        }
        Ok(bot)
    }

    /// Stop (if needed) and remove a bot.
    ///
    /// # Errors
    ///
    /// Returns a validation error for foreign bots and a persistence error if
    /// storage fails.
    pub async fn delete(&self, owner_id: i64, bot_id: i64) -> Result<BotSubmission, CoreError> {
        let bot = self.get_owned(owner_id, bot_id).await?;
        if let Err(e) = self.supervisor.stop(bot.id).await {
            warn!("Failed to stop bot {} before deletion: {e}", bot.id);
        }
        self.storage.delete_bot(bot.id).await?;
        info!("Bot {} (@{}) deleted by owner {owner_id}", bot.id, bot.username);
        Ok(bot)
    }

    /// Every bot for the admin list, newest first, with expiry counters.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins and a persistence error if
    /// storage fails.
    pub async fn overview(
        &self,
        actor: &User,
        page: u32,
        per_page: u32,
    ) -> Result<BotOverview, CoreError> {
        self.gate.authorize(actor, "view_all_bots").await?;
        let now = Utc::now();
        let mut bots = self.storage.all_bots().await?;
        bots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = bots.len();
        let running = bots.iter().filter(|b| b.status == BotStatus::Running).count();
        let expired = bots.iter().filter(|b| b.is_expired(now)).count();
        let expiring_soon = bots
            .iter()
            .filter(|b| b.expires_within(now, Duration::days(7)))
            .count();

        let per_page = per_page.max(1) as usize;
        let total_pages = u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX).max(1);
        let page = page.min(total_pages - 1);
        let bots = bots
            .into_iter()
            .skip(page as usize * per_page)
            .take(per_page)
            .collect();

        Ok(BotOverview {
            bots,
            page,
            total_pages,
            total,
            running,
            expired,
            expiring_soon,
        })
    }

    /// Extend a bot's hosting period by `days`, counted from now if it has
    /// already expired. Admins only.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, a validation error for an
    /// out-of-range extension or unknown bot, and a persistence error if
    /// storage fails.
    pub async fn extend(
        &self,
        actor: &User,
        bot_id: i64,
        days: u32,
    ) -> Result<BotSubmission, CoreError> {
        self.gate.authorize(actor, ACTION_EXTEND_BOT).await?;
        if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
            return Err(ValidationError::InvalidExtension {
                max_days: MAX_EXTENSION_DAYS,
            }
            .into());
        }
        let mut bot = self
            .storage
            .get_bot(bot_id)
            .await?
            .ok_or(ValidationError::BotNotFound(bot_id))?;

        let expires_at = bot.expires_at.max(Utc::now()) + Duration::days(i64::from(days));
        if !self.storage.set_bot_expiry(bot_id, expires_at).await? {
            return Err(ValidationError::BotNotFound(bot_id).into());
        }
        bot.expires_at = expires_at;

        let details = format!("days={days} expires_at={}", expires_at.to_rfc3339());
        self.storage
            .record_admin_action(actor.id, ACTION_EXTEND_BOT, Some(bot_id), Some(details))
            .await?;
        info!("Admin {} extended bot {bot_id} by {days} days", actor.id);
        Ok(bot)
    }

    /// Stop every running bot whose hosting period is over.
    ///
    /// Returns the bots that were stopped. A runtime that refuses to stop is
    /// logged; the bot is marked stopped anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<BotSubmission>, StorageError> {
        let mut expired = Vec::new();
        for mut bot in self.storage.list_bots_by_status(BotStatus::Running).await? {
            if !bot.is_expired(now) {
                continue;
            }
            if let Err(e) = self.supervisor.stop(bot.id).await {
                warn!("Failed to stop expired bot {}: {e}", bot.id);
            }
            self.storage
                .update_bot_status(bot.id, BotStatus::Stopped)
                .await?;
            bot.status = BotStatus::Stopped;
            info!("Bot {} (@{}) expired and was stopped", bot.id, bot.username);
            expired.push(bot);
        }
        Ok(expired)
    }

    /// [`Self::expire_due`] on an admin's request, audited.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins and a persistence error if
    /// storage fails.
    pub async fn expire_now(&self, actor: &User) -> Result<Vec<BotSubmission>, CoreError> {
        self.gate.authorize(actor, ACTION_EXPIRE_BOTS).await?;
        let expired = self.expire_due(Utc::now()).await?;
        self.storage
            .record_admin_action(
                actor.id,
                ACTION_EXPIRE_BOTS,
                None,
                Some(format!("stopped={}", expired.len())),
            )
            .await?;
        Ok(expired)
    }

    /// Start every bot persisted as running. Failures and expired bots are
    /// marked stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the running bots cannot be listed.
    pub async fn resume_running(&self) -> Result<ResumeReport, StorageError> {
        let mut report = ResumeReport::default();
        let now = Utc::now();
        for bot in self.storage.list_bots_by_status(BotStatus::Running).await? {
            if bot.is_expired(now) {
                info!("Bot {} (@{}) expired while offline", bot.id, bot.username);
                report.expired += 1;
                self.storage
                    .update_bot_status(bot.id, BotStatus::Stopped)
                    .await?;
                continue;
            }
            match self.supervisor.start(&bot).await {
                Ok(()) => report.started += 1,
                Err(e) => {
                    error!("Failed to resume bot {} (@{}): {e}", bot.id, bot.username);
                    report.failed += 1;
                    self.storage
                        .update_bot_status(bot.id, BotStatus::Stopped)
                        .await?;
                }
            }
        }
        info!(
            "Resumed {} hosted bots ({} failed, {} expired)",
            report.started, report.failed, report.expired
        );
        Ok(report)
    }

    async fn launch_bot(&self, bot: &mut BotSubmission) -> Result<(), CoreError> {
        if !bot.status.can_transition_to(BotStatus::Running) {
            return Err(ValidationError::InvalidStatusTransition {
                from: bot.status,
                to: BotStatus::Running,
            }
            .into());
        }
        if bot.is_expired(Utc::now()) {
            return Err(ValidationError::BotExpired(bot.id).into());
        }
        self.supervisor.start(bot).await?;
        self.transition(bot, BotStatus::Running).await
    }

    async fn check_capacity(&self, owner_id: i64, token: &BotToken) -> Result<(), CoreError> {
        if self.policy.platform_bot_id.as_deref() == Some(token.bot_id_part()) {
            warn!("User {owner_id} submitted the platform token");
            return Err(ValidationError::PlatformToken.into());
        }
        let owned = self.storage.count_bots_by_owner(owner_id).await?;
        if owned >= i64::from(self.policy.max_bots_per_user) {
            return Err(ValidationError::BotLimitReached {
                limit: self.policy.max_bots_per_user,
            }
            .into());
        }
        if self
            .storage
            .find_bot_by_fingerprint(&token.fingerprint())
            .await?
            .is_some()
        {
            return Err(ValidationError::DuplicateBot.into());
        }
        Ok(())
    }

    async fn transition(&self, bot: &mut BotSubmission, next: BotStatus) -> Result<(), CoreError> {
        if !bot.status.can_transition_to(next) {
            return Err(ValidationError::InvalidStatusTransition {
                from: bot.status,
                to: next,
            }
            .into());
        }
        self.storage.update_bot_status(bot.id, next).await?;
        bot.status = next;
        Ok(())
    }
}
