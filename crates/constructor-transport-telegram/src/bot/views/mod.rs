//! View layer for bot UI components
//!
//! Contains keyboards, messages, and formatting for Telegram UI. All text is
//! HTML; anything user-supplied goes through [`escape`].

pub mod admin;
pub mod channels;
pub mod hosted;
pub mod menu;

use constructor_core::error::{CoreError, PermissionError, ValidationError};

/// Escape user-supplied text for HTML parse mode.
#[must_use]
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).to_string()
}

/// User-facing text for a failed operation.
#[must_use]
pub fn error_text(error: &CoreError) -> String {
    match error {
        CoreError::Validation(e) => validation_text(e),
        CoreError::Permission(e) => permission_text(e).to_string(),
        CoreError::ExternalApi(_) => {
            "⚠️ Telegram is not responding right now. Please try again in a minute.".to_string()
        }
        CoreError::Persistence(_) => generic_failure().to_string(),
        CoreError::Transition(_) => {
            "⚠️ That action is not available right now. Use the menu to start over.".to_string()
        }
    }
}

/// Shown when a step was aborted by an internal failure.
#[must_use]
pub const fn generic_failure() -> &'static str {
    "❌ Something went wrong. The current operation was cancelled, please try again."
}

fn validation_text(error: &ValidationError) -> String {
    match error {
        ValidationError::EmptyBody => "⚠️ The message is empty. Send some text.".to_string(),
        ValidationError::BodyTooLong { len, max } => {
            format!("⚠️ The message is {len} characters long, the limit is {max}. Please shorten it.")
        }
        ValidationError::MalformedToken => "⚠️ This does not look like a bot token.\n\n\
             A token looks like <code>123456789:AAH...</code>. Copy it from @BotFather and send it again."
            .to_string(),
        ValidationError::TokenRejected(reason) => format!(
            "❌ Telegram rejected this token: {}\n\nCheck it in @BotFather and send it again.",
            escape(reason)
        ),
        ValidationError::ValidationTimeout(_) | ValidationError::ValidationUnavailable(_) => {
            "⚠️ Could not check the token right now. Please send it again in a minute.".to_string()
        }
        ValidationError::BotLimitReached { limit } => {
            format!("⚠️ You already have {limit} bots, which is the limit. Delete one to add another.")
        }
        ValidationError::DuplicateBot => "⚠️ This bot is already registered.".to_string(),
        ValidationError::PlatformToken => {
            "⚠️ This is the token of the platform bot itself. Send the token of your own bot."
                .to_string()
        }
        ValidationError::BotExpired(_) => {
            "⌛ This bot's hosting period is over. Contact an admin to extend it.".to_string()
        }
        ValidationError::InvalidExtension { max_days } => format!(
            "⚠️ Send the bot id and the days, for example <code>12 30</code>. Days: 1 to {max_days}."
        ),
        ValidationError::MalformedChannel(raw) => format!(
            "⚠️ <code>{}</code> is not a channel. Send @username, a t.me link or a -100... id.",
            escape(raw)
        ),
        ValidationError::DuplicateChannel(title) => {
            format!("⚠️ {} is already required.", escape(title))
        }
        ValidationError::ChannelNotFound(channel) => format!(
            "⚠️ Channel {} was not found. Check the name and make sure the platform bot is an admin there.",
            escape(channel)
        ),
        ValidationError::ChannelNotRequired(_) => {
            "⚠️ This channel is no longer required.".to_string()
        }
        ValidationError::UnsupportedLanguage(code) => {
            format!("⚠️ Language <code>{}</code> is not supported.", escape(code))
        }
        ValidationError::UserNotFound(query) => {
            format!("🔍 No user found for <code>{}</code>. Try another id or username.", escape(query))
        }
        ValidationError::BotNotFound(_) | ValidationError::NotBotOwner(_) => {
            "⚠️ This bot is no longer available.".to_string()
        }
        ValidationError::InvalidStatusTransition { from, .. } => {
            format!("⚠️ A bot that is {from} cannot be started yet.")
        }
        ValidationError::EmptyQuery => "⚠️ Send a user id or @username.".to_string(),
    }
}

const fn permission_text(error: &PermissionError) -> &'static str {
    match error {
        PermissionError::NotAdmin { .. } => "⛔️ Access denied",
        PermissionError::OwnerOnly { .. } => "⛔️ Only platform owners can change admin roles.",
        PermissionError::ProtectedOwner { .. } => "⛔️ Platform owners cannot be banned or demoted.",
        PermissionError::SelfTarget => "⛔️ You cannot do this to yourself.",
    }
}
