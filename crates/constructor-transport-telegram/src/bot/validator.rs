//! Bot token validation through `getMe`

use async_trait::async_trait;
use constructor_core::error::ValidationError;
use constructor_core::validator::{BotInfo, BotToken, TokenValidator};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

/// [`TokenValidator`] that asks Telegram who the token belongs to
pub struct TelegramTokenValidator {
    timeout: Duration,
}

impl TelegramTokenValidator {
    /// Create a validator that gives `getMe` at most `timeout` to answer.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TokenValidator for TelegramTokenValidator {
    async fn validate(&self, token: &BotToken) -> Result<BotInfo, ValidationError> {
        let bot = Bot::new(token.expose());
        let me = match tokio::time::timeout(self.timeout, bot.get_me()).await {
            Ok(Ok(me)) => me,
            Ok(Err(e)) => return Err(map_error(token, &e)),
            Err(_) => {
                warn!("getMe for {token} timed out after {:?}", self.timeout);
                return Err(ValidationError::ValidationTimeout(self.timeout));
            }
        };

        if !me.is_bot {
            return Err(ValidationError::TokenRejected(
                "the token does not belong to a bot".to_string(),
            ));
        }

        debug!("Token {token} belongs to @{}", me.username());
        Ok(BotInfo {
            id: me.id.0.cast_signed(),
            name: me.first_name.clone(),
            username: me.username().to_string(),
        })
    }
}

/// Errors never carry the token itself.
fn map_error(token: &BotToken, error: &RequestError) -> ValidationError {
    match error {
        RequestError::Api(ApiError::InvalidToken) => {
            ValidationError::TokenRejected("Telegram does not recognise this token".to_string())
        }
        RequestError::Api(api) => ValidationError::TokenRejected(api.to_string()),
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_) => {
            warn!("getMe for {token} could not reach Telegram");
            ValidationError::ValidationUnavailable("Telegram is not reachable".to_string())
        }
        other => {
            warn!("getMe for {token} failed: {}", other.to_string().replace(token.expose(), "***"));
            ValidationError::ValidationUnavailable("unexpected Telegram response".to_string())
        }
    }
}
