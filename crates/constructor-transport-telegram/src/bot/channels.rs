//! Channel lookups and membership checks through the Bot API
//!
//! The platform bot has to be an admin of private channels for
//! `getChatMember` to answer.

use async_trait::async_trait;
use constructor_core::channels::{ChannelDirectory, ChannelInfo, ChannelRef};
use constructor_core::error::ExternalApiError;
use teloxide::prelude::*;
use teloxide::types::{Recipient, UserId};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// [`ChannelDirectory`] backed by the platform bot
#[derive(Clone)]
pub struct TelegramChannelDirectory {
    bot: Bot,
}

impl TelegramChannelDirectory {
    /// Create a directory using the platform bot.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn recipient(channel: &ChannelRef) -> Recipient {
    match channel {
        ChannelRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
        ChannelRef::ChatId(id) => Recipient::Id(ChatId(*id)),
    }
}

fn api_failure(error: &RequestError) -> ExternalApiError {
    ExternalApiError::Telegram(error.to_string())
}

#[async_trait]
impl ChannelDirectory for TelegramChannelDirectory {
    async fn resolve(&self, channel: &ChannelRef) -> Result<Option<ChannelInfo>, ExternalApiError> {
        match self.bot.get_chat(recipient(channel)).await {
            Ok(chat) => Ok(Some(ChannelInfo {
                chat_id: chat.id.0,
                title: chat
                    .title()
                    .map_or_else(|| channel.to_string(), str::to_string),
                username: chat.username().map(str::to_string),
            })),
            Err(RequestError::Api(ApiError::ChatNotFound)) => {
                debug!("Channel {channel} not found");
                Ok(None)
            }
            Err(e) => Err(api_failure(&e)),
        }
    }

    async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool, ExternalApiError> {
        match self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(user_id.cast_unsigned()))
            .await
        {
            Ok(member) => Ok(member.kind.is_present()),
            Err(RequestError::Api(ApiError::UserNotFound)) => Ok(false),
            Err(e) => Err(api_failure(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_sent_with_at_sign() {
        assert_eq!(
            recipient(&ChannelRef::Username("news_channel".into())),
            Recipient::ChannelUsername("@news_channel".into())
        );
        assert_eq!(
            recipient(&ChannelRef::ChatId(-100_500)),
            Recipient::Id(ChatId(-100_500))
        );
    }
}
