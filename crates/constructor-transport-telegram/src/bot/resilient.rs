//! Resilient messaging with automatic retry for Telegram API operations.
//!
//! Used for one-off service messages such as owner notifications. Broadcast
//! sends never go through here: a failed recipient is counted, not retried.

use anyhow::Result;
use constructor_core::utils::retry_transport_operation;
use std::collections::HashSet;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, ParseMode};
use tracing::warn;

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    retry_transport_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Send an HTML notice to every owner. Failures are logged and skipped.
///
/// Returns the number of owners that received it.
pub async fn notify_owners(bot: &Bot, owners: &HashSet<i64>, text: &str) -> usize {
    let mut delivered = 0;
    for &owner in owners {
        match send_message_resilient(bot, ChatId(owner), text, Some(ParseMode::Html)).await {
            Ok(_) => delivered += 1,
            Err(e) => warn!("Failed to notify owner {owner}: {e}"),
        }
    }
    delivered
}
