//! Domain records
//!
//! Users, hosted bot submissions, broadcast records, required channels and
//! admin actions.

use crate::validator::{BotInfo, BotToken};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    /// Regular user
    #[default]
    User,
    /// Administrator
    Admin,
}

impl Role {
    /// Storage tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Interface language a user can pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// English
    #[default]
    En,
    /// Russian
    Ru,
    /// Uzbek
    Uz,
}

impl Language {
    /// Every supported language, in menu order.
    pub const ALL: [Self; 3] = [Self::En, Self::Ru, Self::Uz];

    /// Stored code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
            Self::Uz => "uz",
        }
    }

    /// Label with flag
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::En => "🇺🇸 English",
            Self::Ru => "🇷🇺 Русский",
            Self::Uz => "🇺🇿 O'zbek",
        }
    }

    /// Supported language for a stored or client-reported code.
    ///
    /// Region suffixes are ignored, so `ru-RU` reads as Russian.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(primary))
    }
}

/// Identity fields reported by Telegram on every update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    /// Telegram user id
    pub id: i64,
    /// `@username` without the at sign
    pub username: Option<String>,
    /// First name
    pub first_name: Option<String>,
    /// Last name
    pub last_name: Option<String>,
    /// IETF language tag reported by the client
    pub language_code: Option<String>,
}

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Telegram user id
    pub id: i64,
    /// `@username` without the at sign
    pub username: Option<String>,
    /// First name
    pub first_name: Option<String>,
    /// Last name
    pub last_name: Option<String>,
    /// Preferred language
    pub language_code: Option<String>,
    /// Platform role
    pub role: Role,
    /// Cleared while banned
    pub is_active: bool,
    /// Banned users are ignored by every flow
    pub is_banned: bool,
    /// Reason given by the admin who banned the user
    pub ban_reason: Option<String>,
    /// First contact
    pub joined_at: DateTime<Utc>,
    /// Most recent interaction
    pub last_activity_at: DateTime<Utc>,
    /// Interactions seen so far
    pub message_count: i64,
}

impl User {
    /// First and last name joined, or an empty string.
    #[must_use]
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Name suitable for admin listings.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(username) = &self.username {
            return format!("@{username}");
        }
        let full = self.full_name();
        if full.is_empty() {
            format!("id{}", self.id)
        } else {
            full
        }
    }

    /// Eligible for broadcasts.
    #[must_use]
    pub const fn is_recipient(&self) -> bool {
        self.is_active && !self.is_banned
    }

    /// Supported language of this user, English when unknown.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language_code
            .as_deref()
            .and_then(Language::from_code)
            .unwrap_or_default()
    }
}

/// Lifecycle of a hosted bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BotStatus {
    /// Stored, token not yet checked
    Pending,
    /// Token confirmed by Telegram
    Validated,
    /// Hosted runtime is up
    Running,
    /// Hosted runtime stopped by the owner or after a failure
    Stopped,
}

impl BotStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Validated, Self::Running, Self::Stopped];

    /// Storage tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    /// Allowed edges: pending→validated→running→stopped, stopped→running.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Validated)
                | (Self::Validated | Self::Stopped, Self::Running)
                | (Self::Running, Self::Stopped)
        )
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown bot status: {s}"))
    }
}

/// Bot registered by a user
#[derive(Debug, Clone, PartialEq)]
pub struct BotSubmission {
    /// Row id
    pub id: i64,
    /// User who submitted the token
    pub owner_id: i64,
    /// Bot API credential
    pub token: BotToken,
    /// Telegram id of the bot account
    pub bot_user_id: i64,
    /// Display name returned by `getMe`
    pub name: String,
    /// `@username` of the bot
    pub username: String,
    /// Lifecycle status
    pub status: BotStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// End of the hosting period
    pub expires_at: DateTime<Utc>,
}

impl BotSubmission {
    /// Hosting period is over.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whole days of hosting left, 0 once expired.
    #[must_use]
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }

    /// Expires within `window` but has not expired yet.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_expired(now) && self.expires_at <= now + window
    }
}

/// Insert payload for a bot submission
#[derive(Debug, Clone)]
pub struct NewBot {
    /// Submitting user
    pub owner_id: i64,
    /// Credential
    pub token: BotToken,
    /// Result of the `getMe` check
    pub info: BotInfo,
    /// End of the initial hosting period
    pub expires_at: DateTime<Utc>,
}

/// Channel users must join before using the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredChannel {
    /// Telegram chat id (`-100...`)
    pub chat_id: i64,
    /// Public username without `@`, if any
    pub username: Option<String>,
    /// Channel title
    pub title: String,
    /// Admin who added it
    pub added_by: i64,
    /// When it was added
    pub added_at: DateTime<Utc>,
}

impl RequiredChannel {
    /// Join link for public channels.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.username
            .as_ref()
            .map(|username| format!("https://t.me/{username}"))
    }
}

/// Summary of one completed broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRecord {
    /// Row id
    pub id: i64,
    /// Admin who sent it
    pub initiator_id: i64,
    /// Message text
    pub body: String,
    /// Recipients attempted
    pub recipient_count: i64,
    /// Delivered
    pub sent_count: i64,
    /// Not delivered
    pub failed_count: i64,
    /// Completion time
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a broadcast record
#[derive(Debug, Clone)]
pub struct NewBroadcast {
    /// Admin who sent it
    pub initiator_id: i64,
    /// Message text
    pub body: String,
    /// Recipients attempted
    pub recipient_count: i64,
    /// Delivered
    pub sent_count: i64,
    /// Not delivered
    pub failed_count: i64,
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAction {
    /// Row id
    pub id: i64,
    /// Who acted
    pub actor_id: i64,
    /// Action tag, e.g. `ban_user`
    pub action: String,
    /// Affected user or bot
    pub target_id: Option<i64>,
    /// Free-form details
    pub details: Option<String>,
    /// When it happened
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: Option<&str>, first: Option<&str>, last: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: username.map(str::to_string),
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            language_code: None,
            role: Role::User,
            is_active: true,
            is_banned: false,
            ban_reason: None,
            joined_at: now,
            last_activity_at: now,
            message_count: 0,
        }
    }

    #[test]
    fn display_name_prefers_username() {
        assert_eq!(user(Some("alice"), Some("Alice"), None).display_name(), "@alice");
        assert_eq!(
            user(None, Some("Alice"), Some("Smith")).display_name(),
            "Alice Smith"
        );
        assert_eq!(user(None, None, None).display_name(), "id42");
    }

    #[test]
    fn bot_status_lifecycle() {
        use BotStatus::*;
        assert!(Pending.can_transition_to(Validated));
        assert!(Validated.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Running));

        assert!(!Pending.can_transition_to(Running));
        assert!(!Validated.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Validated));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn language_codes_ignore_region() {
        assert_eq!(Language::from_code("ru-RU"), Some(Language::Ru));
        assert_eq!(Language::from_code("UZ"), Some(Language::Uz));
        assert_eq!(Language::from_code("de"), None);

        let mut german = user(None, None, None);
        german.language_code = Some("de".into());
        assert_eq!(german.language(), Language::En);
    }

    #[test]
    fn expiry_windows() {
        let now = Utc::now();
        let bot = |days: i64| BotSubmission {
            id: 1,
            owner_id: 1,
            token: BotToken::from_stored("1:x".into()),
            bot_user_id: 1,
            name: "b".into(),
            username: "b".into(),
            status: BotStatus::Running,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(days),
        };

        assert!(bot(0).is_expired(now));
        assert_eq!(bot(-3).days_left(now), 0);
        assert_eq!(bot(10).days_left(now), 10);
        assert!(bot(3).expires_within(now, Duration::days(7)));
        assert!(!bot(30).expires_within(now, Duration::days(7)));
        assert!(!bot(-1).expires_within(now, Duration::days(7)));
    }

    #[test]
    fn status_tags_round_trip() {
        for status in BotStatus::ALL {
            assert_eq!(status.as_str().parse::<BotStatus>(), Ok(status));
        }
        assert!("deleted".parse::<BotStatus>().is_err());
    }
}
