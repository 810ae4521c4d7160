//! Storage layer for users, hosted bots, broadcasts and the audit log
//!
//! Provides a persistent storage implementation using `SQLite` via `sqlx`.

use crate::models::{
    AdminAction, BotStatus, BotSubmission, BroadcastRecord, NewBot, NewBroadcast, RequiredChannel,
    Role, User, UserProfile,
};
use crate::validator::BotToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be mapped back to a domain record
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    /// A uniqueness constraint rejected the write
    #[error("Conflicting record: {0}")]
    Conflict(String),
}

impl StorageError {
    fn from_write(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// Interface for storage providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Insert the user on first contact, otherwise refresh profile fields,
    /// bump the message counter and last activity. Returns the stored user
    /// and whether it was just created.
    async fn touch_user(
        &self,
        profile: &UserProfile,
        initial_role: Role,
        now: DateTime<Utc>,
    ) -> Result<(User, bool), StorageError>;
    /// Refresh last activity without counting a message. `None` for unknown
    /// users.
    async fn record_activity(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StorageError>;
    /// Store the chosen interface language
    async fn set_user_language(&self, user_id: i64, code: &str) -> Result<bool, StorageError>;
    /// Get a user by Telegram id
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError>;
    /// Case-insensitive lookup by username (without `@`)
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    /// Page of users, newest first
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StorageError>;
    /// Every user, oldest first
    async fn all_users(&self) -> Result<Vec<User>, StorageError>;
    /// Number of registered users
    async fn count_users(&self) -> Result<i64, StorageError>;
    /// Ban or unban. Banned users are also marked inactive.
    async fn set_user_banned(
        &self,
        user_id: i64,
        banned: bool,
        reason: Option<String>,
    ) -> Result<bool, StorageError>;
    /// Change the platform role
    async fn set_user_role(&self, user_id: i64, role: Role) -> Result<bool, StorageError>;
    /// Ids of active, non-banned users
    async fn broadcast_recipients(&self) -> Result<Vec<i64>, StorageError>;
    /// Store a new bot submission
    async fn insert_bot(&self, bot: &NewBot, status: BotStatus)
        -> Result<BotSubmission, StorageError>;
    /// Get a bot by row id
    async fn get_bot(&self, bot_id: i64) -> Result<Option<BotSubmission>, StorageError>;
    /// Bots owned by a user
    async fn list_bots_by_owner(&self, owner_id: i64) -> Result<Vec<BotSubmission>, StorageError>;
    /// Number of bots owned by a user
    async fn count_bots_by_owner(&self, owner_id: i64) -> Result<i64, StorageError>;
    /// Bot registered with the same token, if any
    async fn find_bot_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<BotSubmission>, StorageError>;
    /// Bots in a given status
    async fn list_bots_by_status(
        &self,
        status: BotStatus,
    ) -> Result<Vec<BotSubmission>, StorageError>;
    /// Every bot
    async fn all_bots(&self) -> Result<Vec<BotSubmission>, StorageError>;
    /// Set the lifecycle status
    async fn update_bot_status(&self, bot_id: i64, status: BotStatus)
        -> Result<bool, StorageError>;
    /// Move the end of the hosting period
    async fn set_bot_expiry(
        &self,
        bot_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
    /// Remove a bot submission
    async fn delete_bot(&self, bot_id: i64) -> Result<bool, StorageError>;
    /// Append a broadcast record
    async fn insert_broadcast(&self, record: &NewBroadcast)
        -> Result<BroadcastRecord, StorageError>;
    /// Every broadcast record
    async fn list_broadcasts(&self) -> Result<Vec<BroadcastRecord>, StorageError>;
    /// Append an audit log entry
    async fn record_admin_action(
        &self,
        actor_id: i64,
        action: &str,
        target_id: Option<i64>,
        details: Option<String>,
    ) -> Result<(), StorageError>;
    /// Most recent audit entries, newest first
    async fn recent_admin_actions(&self, limit: i64) -> Result<Vec<AdminAction>, StorageError>;
    /// Channels users must join, oldest first
    async fn list_required_channels(&self) -> Result<Vec<RequiredChannel>, StorageError>;
    /// Require a channel. A channel that is already required is a conflict.
    async fn insert_required_channel(&self, channel: &RequiredChannel)
        -> Result<(), StorageError>;
    /// Stop requiring a channel
    async fn delete_required_channel(&self, chat_id: i64) -> Result<bool, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

const SCHEMA: [&str; 7] = [
    r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        last_name TEXT,
        language_code TEXT,
        role TEXT NOT NULL DEFAULT 'user',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_banned INTEGER NOT NULL DEFAULT 0,
        ban_reason TEXT,
        joined_at TEXT NOT NULL,
        last_activity_at TEXT NOT NULL,
        message_count INTEGER NOT NULL DEFAULT 0
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS bots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        token TEXT NOT NULL,
        token_fingerprint TEXT NOT NULL UNIQUE,
        bot_user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        username TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS broadcasts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        initiator_id INTEGER NOT NULL,
        body TEXT NOT NULL,
        recipient_count INTEGER NOT NULL,
        sent_count INTEGER NOT NULL,
        failed_count INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS admin_actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        target_id INTEGER,
        details TEXT,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS required_channels (
        chat_id INTEGER PRIMARY KEY,
        username TEXT,
        title TEXT NOT NULL,
        added_by INTEGER NOT NULL,
        added_at TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_bots_owner_id ON bots(owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_users_username ON users(username COLLATE NOCASE)",
];

impl SqliteStorage {
    /// Open (or create) the database and make sure the schema exists.
    ///
    /// Accepts `sqlite://path`, `sqlite::memory:` or a plain file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        info!("Initializing SQLite storage: {database_url}");

        let options = if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url)?
        } else {
            SqliteConnectOptions::new().filename(database_url)
        }
        .create_if_missing(true);

        // An in-memory database lives and dies with its single connection
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    async fn init(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }

    async fn fetch_bots(
        &self,
        sql: &str,
        bind: Option<i64>,
    ) -> Result<Vec<BotSubmission>, StorageError> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(bot_from_row)
            .collect()
    }
}

fn corrupt(err: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(err.to_string())
}

fn user_from_row(row: &SqliteRow) -> Result<User, StorageError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        language_code: row.try_get("language_code")?,
        role: role.parse().map_err(corrupt)?,
        is_active: row.try_get("is_active")?,
        is_banned: row.try_get("is_banned")?,
        ban_reason: row.try_get("ban_reason")?,
        joined_at: row.try_get("joined_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
        message_count: row.try_get("message_count")?,
    })
}

fn bot_from_row(row: &SqliteRow) -> Result<BotSubmission, StorageError> {
    let status: String = row.try_get("status")?;
    Ok(BotSubmission {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        token: BotToken::from_stored(row.try_get("token")?),
        bot_user_id: row.try_get("bot_user_id")?,
        name: row.try_get("name")?,
        username: row.try_get("username")?,
        status: status.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn channel_from_row(row: &SqliteRow) -> Result<RequiredChannel, StorageError> {
    Ok(RequiredChannel {
        chat_id: row.try_get("chat_id")?,
        username: row.try_get("username")?,
        title: row.try_get("title")?,
        added_by: row.try_get("added_by")?,
        added_at: row.try_get("added_at")?,
    })
}

fn broadcast_from_row(row: &SqliteRow) -> Result<BroadcastRecord, StorageError> {
    Ok(BroadcastRecord {
        id: row.try_get("id")?,
        initiator_id: row.try_get("initiator_id")?,
        body: row.try_get("body")?,
        recipient_count: row.try_get("recipient_count")?,
        sent_count: row.try_get("sent_count")?,
        failed_count: row.try_get("failed_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn action_from_row(row: &SqliteRow) -> Result<AdminAction, StorageError> {
    Ok(AdminAction {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        action: row.try_get("action")?,
        target_id: row.try_get("target_id")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl StorageProvider for SqliteStorage {
    async fn touch_user(
        &self,
        profile: &UserProfile,
        initial_role: Role,
        now: DateTime<Utc>,
    ) -> Result<(User, bool), StorageError> {
        let is_new = self.get_user(profile.id).await?.is_none();

        sqlx::query(
            r"
            INSERT INTO users (id, username, first_name, last_name, language_code, role,
                               joined_at, last_activity_at, message_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                language_code = COALESCE(users.language_code, excluded.language_code),
                last_activity_at = excluded.last_activity_at,
                message_count = users.message_count + 1
            ",
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.language_code)
        .bind(initial_role.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let user = self
            .get_user(profile.id)
            .await?
            .ok_or_else(|| {
                StorageError::Corrupt(format!("user {} vanished after upsert", profile.id))
            })?;

        if is_new {
            info!("Registered new user {}", profile.id);
        }
        Ok((user, is_new))
    }

    async fn record_activity(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StorageError> {
        let result = sqlx::query("UPDATE users SET last_activity_at = ? WHERE id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(user_id).await
    }

    async fn set_user_language(&self, user_id: i64, code: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET language_code = ? WHERE id = ?")
            .bind(code)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        sqlx::query("SELECT * FROM users WHERE username = ? COLLATE NOCASE LIMIT 1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StorageError> {
        sqlx::query("SELECT * FROM users ORDER BY joined_at DESC, id DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn all_users(&self) -> Result<Vec<User>, StorageError> {
        sqlx::query("SELECT * FROM users ORDER BY joined_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn count_users(&self) -> Result<i64, StorageError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn set_user_banned(
        &self,
        user_id: i64,
        banned: bool,
        reason: Option<String>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE users SET is_banned = ?, is_active = ?, ban_reason = ? WHERE id = ?",
        )
        .bind(banned)
        .bind(!banned)
        .bind(if banned { reason } else { None })
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_role(&self, user_id: i64, role: Role) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn broadcast_recipients(&self) -> Result<Vec<i64>, StorageError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE is_active = 1 AND is_banned = 0 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_bot(
        &self,
        bot: &NewBot,
        status: BotStatus,
    ) -> Result<BotSubmission, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO bots (owner_id, token, token_fingerprint, bot_user_id, name, username,
                              status, created_at, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(bot.owner_id)
        .bind(bot.token.expose())
        .bind(bot.token.fingerprint())
        .bind(bot.info.id)
        .bind(&bot.info.name)
        .bind(&bot.info.username)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(bot.expires_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        let id = result.last_insert_rowid();
        info!("Stored bot {id} (@{}) for owner {}", bot.info.username, bot.owner_id);

        Ok(BotSubmission {
            id,
            owner_id: bot.owner_id,
            token: bot.token.clone(),
            bot_user_id: bot.info.id,
            name: bot.info.name.clone(),
            username: bot.info.username.clone(),
            status,
            created_at: now,
            updated_at: now,
            expires_at: bot.expires_at,
        })
    }

    async fn get_bot(&self, bot_id: i64) -> Result<Option<BotSubmission>, StorageError> {
        sqlx::query("SELECT * FROM bots WHERE id = ?")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(bot_from_row)
            .transpose()
    }

    async fn list_bots_by_owner(&self, owner_id: i64) -> Result<Vec<BotSubmission>, StorageError> {
        self.fetch_bots(
            "SELECT * FROM bots WHERE owner_id = ? ORDER BY created_at ASC, id ASC",
            Some(owner_id),
        )
        .await
    }

    async fn count_bots_by_owner(&self, owner_id: i64) -> Result<i64, StorageError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bots WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn find_bot_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<BotSubmission>, StorageError> {
        sqlx::query("SELECT * FROM bots WHERE token_fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(bot_from_row)
            .transpose()
    }

    async fn list_bots_by_status(
        &self,
        status: BotStatus,
    ) -> Result<Vec<BotSubmission>, StorageError> {
        sqlx::query("SELECT * FROM bots WHERE status = ? ORDER BY id ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(bot_from_row)
            .collect()
    }

    async fn all_bots(&self) -> Result<Vec<BotSubmission>, StorageError> {
        self.fetch_bots("SELECT * FROM bots ORDER BY id ASC", None)
            .await
    }

    async fn update_bot_status(
        &self,
        bot_id: i64,
        status: BotStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE bots SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_bot_expiry(
        &self,
        bot_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE bots SET expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(expires_at)
            .bind(Utc::now())
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_bot(&self, bot_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_broadcast(
        &self,
        record: &NewBroadcast,
    ) -> Result<BroadcastRecord, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO broadcasts (initiator_id, body, recipient_count, sent_count, failed_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(record.initiator_id)
        .bind(&record.body)
        .bind(record.recipient_count)
        .bind(record.sent_count)
        .bind(record.failed_count)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(BroadcastRecord {
            id: result.last_insert_rowid(),
            initiator_id: record.initiator_id,
            body: record.body.clone(),
            recipient_count: record.recipient_count,
            sent_count: record.sent_count,
            failed_count: record.failed_count,
            created_at: now,
        })
    }

    async fn list_broadcasts(&self) -> Result<Vec<BroadcastRecord>, StorageError> {
        sqlx::query("SELECT * FROM broadcasts ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(broadcast_from_row)
            .collect()
    }

    async fn record_admin_action(
        &self,
        actor_id: i64,
        action: &str,
        target_id: Option<i64>,
        details: Option<String>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO admin_actions (actor_id, action, target_id, details, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(actor_id)
        .bind(action)
        .bind(target_id)
        .bind(details)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_admin_actions(&self, limit: i64) -> Result<Vec<AdminAction>, StorageError> {
        sqlx::query("SELECT * FROM admin_actions ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(action_from_row)
            .collect()
    }

    async fn list_required_channels(&self) -> Result<Vec<RequiredChannel>, StorageError> {
        sqlx::query("SELECT * FROM required_channels ORDER BY added_at ASC, chat_id ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(channel_from_row)
            .collect()
    }

    async fn insert_required_channel(
        &self,
        channel: &RequiredChannel,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO required_channels (chat_id, username, title, added_by, added_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(channel.chat_id)
        .bind(&channel.username)
        .bind(&channel.title)
        .bind(channel.added_by)
        .bind(channel.added_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;
        Ok(())
    }

    async fn delete_required_channel(&self, chat_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM required_channels WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn check_connection(&self) -> Result<(), String> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                info!("SQLite connection OK");
                Ok(())
            }
            Err(e) => Err(format!("SQLite connection check failed: {e}")),
        }
    }
}
