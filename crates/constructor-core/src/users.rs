//! User registry
//!
//! Registration on first contact, admin lookups, bans and role changes.
//! Every admin mutation is written to the audit log.

use crate::error::{CoreError, PermissionError, ValidationError};
use crate::models::{Language, Role, User, UserProfile};
use crate::permissions::AdminGate;
use crate::storage::{StorageError, StorageProvider};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Result of [`UserRegistry::touch`]
#[derive(Debug, Clone)]
pub struct TouchedUser {
    /// Stored state after the update
    pub user: User,
    /// First contact
    pub is_new: bool,
}

/// One page of the admin user list
#[derive(Debug, Clone)]
pub struct UserPage {
    /// Users on this page
    pub users: Vec<User>,
    /// Zero-based page index
    pub page: u32,
    /// Total number of pages (at least 1)
    pub total_pages: u32,
    /// Total number of users
    pub total_users: i64,
}

/// User registry backed by a [`StorageProvider`]
pub struct UserRegistry {
    storage: Arc<dyn StorageProvider>,
    gate: Arc<AdminGate>,
}

impl UserRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageProvider>, gate: Arc<AdminGate>) -> Self {
        Self { storage, gate }
    }

    /// Admin gate used by this registry.
    #[must_use]
    pub fn gate(&self) -> &Arc<AdminGate> {
        &self.gate
    }

    /// Record an interaction, registering the user on first contact.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn touch(&self, profile: &UserProfile) -> Result<TouchedUser, StorageError> {
        let initial_role = self.gate.initial_role(profile.id);
        let (user, is_new) = self
            .storage
            .touch_user(profile, initial_role, Utc::now())
            .await?;
        Ok(TouchedUser { user, is_new })
    }

    /// Refresh last activity for a button press or similar non-message
    /// interaction. `None` for users not registered yet.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn record_activity(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        self.storage.record_activity(user_id, Utc::now()).await
    }

    /// Store the user's interface language.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unsupported codes and unknown users.
    pub async fn set_language(&self, user_id: i64, code: &str) -> Result<User, CoreError> {
        let language = Language::from_code(code)
            .ok_or_else(|| ValidationError::UnsupportedLanguage(code.to_string()))?;
        if !self
            .storage
            .set_user_language(user_id, language.code())
            .await?
        {
            return Err(ValidationError::UserNotFound(user_id.to_string()).into());
        }
        info!("User {user_id} switched language to {}", language.code());
        self.reload(user_id).await
    }

    /// Look a user up by id.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn get(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        self.storage.get_user(user_id).await
    }

    /// Find a user by numeric id or `@username`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank queries or no match.
    pub async fn search(&self, query: &str) -> Result<User, CoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let found = match query.parse::<i64>() {
            Ok(id) => self.storage.get_user(id).await?,
            Err(_) => {
                self.storage
                    .find_user_by_username(query.trim_start_matches('@'))
                    .await?
            }
        };
        found.ok_or_else(|| ValidationError::UserNotFound(query.to_string()).into())
    }

    /// Page of users for the admin list, newest first.
    ///
    /// Out-of-range pages are clamped to the last page.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn page(&self, page: u32, per_page: u32) -> Result<UserPage, StorageError> {
        let per_page = per_page.max(1);
        let total_users = self.storage.count_users().await?;
        let per_page_i64 = i64::from(per_page);
        let total_pages = u32::try_from((total_users + per_page_i64 - 1) / per_page_i64)
            .unwrap_or(u32::MAX)
            .max(1);
        let page = page.min(total_pages - 1);
        let users = self
            .storage
            .list_users(i64::from(page) * i64::from(per_page), i64::from(per_page))
            .await?;
        Ok(UserPage {
            users,
            page,
            total_pages,
            total_users,
        })
    }

    /// Ids of users eligible for a broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn recipients(&self) -> Result<Vec<i64>, StorageError> {
        self.storage.broadcast_recipients().await
    }

    /// Ban a user. Owners and the acting admin cannot be banned.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins or protected targets and a
    /// validation error for unknown users.
    pub async fn ban(
        &self,
        actor: &User,
        target_id: i64,
        reason: Option<String>,
    ) -> Result<User, CoreError> {
        self.gate.authorize(actor, "ban_user").await?;
        if actor.id == target_id {
            return Err(PermissionError::SelfTarget.into());
        }
        if self.gate.is_owner(target_id) {
            return Err(PermissionError::ProtectedOwner { target_id }.into());
        }
        self.set_banned(actor, target_id, true, reason).await
    }

    /// Lift a ban.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins and a validation error for
    /// unknown users.
    pub async fn unban(&self, actor: &User, target_id: i64) -> Result<User, CoreError> {
        self.gate.authorize(actor, "unban_user").await?;
        self.set_banned(actor, target_id, false, None).await
    }

    /// Grant the admin role. Owners only.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-owners and a validation error for
    /// unknown users.
    pub async fn promote(&self, actor: &User, target_id: i64) -> Result<User, CoreError> {
        self.gate.authorize_owner(actor, "promote_user").await?;
        self.set_role(actor, target_id, Role::Admin, "promote_user").await
    }

    /// Revoke the admin role. Owners only; owners cannot be demoted.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-owners or owner targets and a
    /// validation error for unknown users.
    pub async fn demote(&self, actor: &User, target_id: i64) -> Result<User, CoreError> {
        self.gate.authorize_owner(actor, "demote_user").await?;
        if self.gate.is_owner(target_id) {
            return Err(PermissionError::ProtectedOwner { target_id }.into());
        }
        self.set_role(actor, target_id, Role::User, "demote_user").await
    }

    async fn set_banned(
        &self,
        actor: &User,
        target_id: i64,
        banned: bool,
        reason: Option<String>,
    ) -> Result<User, CoreError> {
        let action = if banned { "ban_user" } else { "unban_user" };
        if !self
            .storage
            .set_user_banned(target_id, banned, reason.clone())
            .await?
        {
            return Err(ValidationError::UserNotFound(target_id.to_string()).into());
        }
        self.storage
            .record_admin_action(actor.id, action, Some(target_id), reason)
            .await?;
        info!("Admin {} performed {action} on user {target_id}", actor.id);
        self.reload(target_id).await
    }

    async fn set_role(
        &self,
        actor: &User,
        target_id: i64,
        role: Role,
        action: &str,
    ) -> Result<User, CoreError> {
        if !self.storage.set_user_role(target_id, role).await? {
            return Err(ValidationError::UserNotFound(target_id.to_string()).into());
        }
        self.storage
            .record_admin_action(actor.id, action, Some(target_id), None)
            .await?;
        info!("Owner {} performed {action} on user {target_id}", actor.id);
        self.reload(target_id).await
    }

    async fn reload(&self, user_id: i64) -> Result<User, CoreError> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| ValidationError::UserNotFound(user_id.to_string()).into())
    }
}
