//! Broadcast fan-out
//!
//! An admin message is delivered to every eligible user with a bounded
//! number of sends in flight. Failed recipients are counted, never retried.

mod dispatcher;

pub use dispatcher::{BroadcastDispatcher, BroadcastOptions, BroadcastSummary, DeliveryReport};

use crate::error::ValidationError;
use async_trait::async_trait;
use std::time::Duration;

/// Why a single send failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Recipient blocked the bot, deleted the account, or the chat is gone
    Unreachable,
    /// Telegram asked to slow down
    RateLimited {
        /// Pause requested by Telegram
        retry_after: Duration,
    },
    /// The send did not finish within the per-recipient timeout
    Timeout,
    /// Anything else
    Other(String),
}

/// Result of one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered
    Sent,
    /// Not delivered
    Failed(FailureReason),
}

impl SendOutcome {
    /// Whether the message was delivered.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Transport that delivers one message to one user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `body` to `recipient`. Never retries.
    async fn send(&self, recipient: i64, body: &str) -> SendOutcome;
}

/// Validated broadcast text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastBody(String);

impl BroadcastBody {
    /// Trim and check the text against the length cap (in characters).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBody`] or
    /// [`ValidationError::BodyTooLong`].
    pub fn parse(raw: &str, max_len: usize) -> Result<Self, ValidationError> {
        let body = raw.trim();
        if body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let len = body.chars().count();
        if len > max_len {
            return Err(ValidationError::BodyTooLong { len, max: max_len });
        }
        Ok(Self(body.to_string()))
    }

    /// The text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
