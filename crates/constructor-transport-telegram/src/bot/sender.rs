//! Broadcast delivery through the Bot API

use async_trait::async_trait;
use constructor_core::broadcast::{FailureReason, MessageSender, SendOutcome};
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// [`MessageSender`] that posts a plain text message per recipient
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    /// Create a sender using the platform bot.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, recipient: i64, body: &str) -> SendOutcome {
        match self.bot.send_message(ChatId(recipient), body).await {
            Ok(_) => SendOutcome::Sent,
            Err(e) => {
                let reason = classify(&e);
                debug!("Broadcast to {recipient} failed: {e}");
                SendOutcome::Failed(reason)
            }
        }
    }
}

/// Map a Bot API error to a broadcast failure reason.
#[must_use]
pub fn classify(error: &RequestError) -> FailureReason {
    match error {
        RequestError::RetryAfter(secs) => FailureReason::RateLimited {
            retry_after: secs.duration(),
        },
        RequestError::Api(api) => classify_api(api),
        other => FailureReason::Other(other.to_string()),
    }
}

fn classify_api(error: &ApiError) -> FailureReason {
    match error {
        ApiError::BotBlocked
        | ApiError::UserDeactivated
        | ApiError::ChatNotFound
        | ApiError::CantInitiateConversation
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup => FailureReason::Unreachable,
        other => FailureReason::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_recipients_are_permanent() {
        for api in [
            ApiError::BotBlocked,
            ApiError::UserDeactivated,
            ApiError::ChatNotFound,
            ApiError::CantInitiateConversation,
        ] {
            assert_eq!(
                classify(&RequestError::Api(api)),
                FailureReason::Unreachable
            );
        }
    }

    #[test]
    fn other_api_errors_keep_their_message() {
        let reason = classify(&RequestError::Api(ApiError::MessageIsTooLong));
        assert!(matches!(reason, FailureReason::Other(msg) if !msg.is_empty()));
    }
}
