//! Error taxonomy
//!
//! Validation, permission and external API failures are recoverable and shown
//! to the user. Persistence failures abort the current step only.

use crate::conversation::TransitionError;
use crate::models::BotStatus;
use crate::reporting::ReportError;
use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Bad user input or a rejected bot credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Broadcast body is empty after trimming
    #[error("message body is empty")]
    EmptyBody,
    /// Broadcast body exceeds the configured cap
    #[error("message body is {len} characters, limit is {max}")]
    BodyTooLong {
        /// Actual length in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },
    /// Token does not look like a Telegram bot token
    #[error("token format is invalid")]
    MalformedToken,
    /// Telegram refused the token
    #[error("token was rejected: {0}")]
    TokenRejected(String),
    /// `getMe` did not answer in time
    #[error("token validation timed out after {0:?}")]
    ValidationTimeout(Duration),
    /// Telegram could not be reached to check the token
    #[error("token validation unavailable: {0}")]
    ValidationUnavailable(String),
    /// Owner already has the maximum number of bots
    #[error("bot limit of {limit} reached")]
    BotLimitReached {
        /// Configured per-user limit
        limit: u32,
    },
    /// Same token is already registered
    #[error("this bot is already registered")]
    DuplicateBot,
    /// Token of the platform bot itself
    #[error("the platform bot cannot be hosted")]
    PlatformToken,
    /// Hosting period is over
    #[error("bot {0} has expired")]
    BotExpired(i64),
    /// Extension request is not `<bot id> <days>` with days in range
    #[error("extension must be '<bot id> <days>' with 1 to {max_days} days")]
    InvalidExtension {
        /// Largest accepted extension
        max_days: u32,
    },
    /// Channel reference is not `@name`, a t.me link or a `-100` id
    #[error("'{0}' is not a channel username, link or id")]
    MalformedChannel(String),
    /// Channel is already required
    #[error("channel {0} is already required")]
    DuplicateChannel(String),
    /// Telegram does not know the channel or the bot cannot see it
    #[error("channel {0} could not be found")]
    ChannelNotFound(String),
    /// No required channel with that id
    #[error("channel {0} is not required")]
    ChannelNotRequired(i64),
    /// Language code outside the supported set
    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),
    /// No user with that id or username
    #[error("user {0} not found")]
    UserNotFound(String),
    /// No bot with that id
    #[error("bot {0} not found")]
    BotNotFound(i64),
    /// Bot belongs to someone else
    #[error("bot {0} belongs to another user")]
    NotBotOwner(i64),
    /// Status change outside the allowed lifecycle
    #[error("bot cannot move from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status
        from: BotStatus,
        /// Requested status
        to: BotStatus,
    },
    /// Search query is blank
    #[error("search query is empty")]
    EmptyQuery,
}

/// Caller lacks the rights for an admin operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Caller is not an admin
    #[error("user {user_id} is not an admin")]
    NotAdmin {
        /// Caller id
        user_id: i64,
    },
    /// Operation is reserved for allow-listed owners
    #[error("user {user_id} is not an owner")]
    OwnerOnly {
        /// Caller id
        user_id: i64,
    },
    /// Owners cannot be banned or demoted
    #[error("user {target_id} is a protected owner")]
    ProtectedOwner {
        /// Target id
        target_id: i64,
    },
    /// Admins cannot act on themselves
    #[error("admins cannot target themselves")]
    SelfTarget,
}

/// Transient failure talking to the Telegram API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalApiError {
    /// Request failed
    #[error("Telegram API error: {0}")]
    Telegram(String),
    /// Request did not complete in time
    #[error("Telegram API timed out after {0:?}")]
    Timeout(Duration),
}

/// Any failure surfaced by a core operation
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad input
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Access denied
    #[error(transparent)]
    Permission(#[from] PermissionError),
    /// Telegram unavailable
    #[error(transparent)]
    ExternalApi(#[from] ExternalApiError),
    /// Storage failure
    #[error(transparent)]
    Persistence(#[from] StorageError),
    /// Event not valid for the current conversation step
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<ReportError> for CoreError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Storage(e) => Self::Persistence(e),
            other => Self::Persistence(StorageError::Corrupt(other.to_string())),
        }
    }
}

impl CoreError {
    /// Whether the current step has to be abandoned.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_is_fatal() {
        assert!(CoreError::from(StorageError::Corrupt("x".into())).is_fatal());
        assert!(!CoreError::from(ValidationError::DuplicateBot).is_fatal());
        assert!(!CoreError::from(ExternalApiError::Telegram("x".into())).is_fatal());
    }

    #[test]
    fn report_failures_abort_the_step() {
        let flush = CoreError::from(ReportError::Flush("disk full".into()));
        assert!(flush.is_fatal());
        assert!(flush.to_string().contains("disk full"));

        let storage = CoreError::from(ReportError::Storage(StorageError::Conflict("x".into())));
        assert!(matches!(storage, CoreError::Persistence(StorageError::Conflict(_))));
    }
}
