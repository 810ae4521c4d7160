use crate::bot::dialogue::ConversationDialogue;
use crate::bot::resilient::notify_owners;
use crate::bot::views::{self, channels as channel_views, menu};
use crate::bot::DenialCache;
use crate::config::BotSettings;
use anyhow::{anyhow, Result};
use constructor_core::channels::ChannelRegistry;
use constructor_core::error::CoreError;
use constructor_core::models::{Language, RequiredChannel, User as StoredUser, UserProfile};
use constructor_core::users::UserRegistry;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardMarkup, ParseMode, User},
    utils::command::BotCommands,
};
use tracing::{error, info, warn};

/// Registry profile of a Telegram user.
#[must_use]
pub fn profile_from(user: &User) -> UserProfile {
    UserProfile {
        id: user.id.0.cast_signed(),
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the main menu
    #[command(description = "Show the main menu.")]
    Start,
    /// Show usage help
    #[command(description = "Show help.")]
    Help,
    /// Abandon the current operation
    #[command(description = "Cancel the current operation.")]
    Cancel,
    /// Open the admin panel
    #[command(description = "Open the admin panel.")]
    Admin,
    /// Pick the interface language
    #[command(description = "Change the language.")]
    Language,
}

/// Record an interaction and load the stored user.
///
/// New users are announced to the owners in the background. Returns `None`
/// when the update has no sender or storage fails, which drops the update.
pub async fn touch_user(
    bot: &Bot,
    from: &User,
    users: &UserRegistry,
    settings: &BotSettings,
) -> Option<StoredUser> {
    let profile = profile_from(from);
    match users.touch(&profile).await {
        Ok(touched) => {
            if touched.is_new {
                info!("New user registered: {} ({})", touched.user.display_name(), profile.id);
                let bot = bot.clone();
                let owners = settings.telegram.admin_user_ids();
                let text = menu::new_user_notice(&touched.user.display_name(), profile.id);
                tokio::spawn(async move {
                    notify_owners(&bot, &owners, &text).await;
                });
            }
            Some(touched.user)
        }
        Err(e) => {
            error!("Failed to record activity of user {}: {e}", profile.id);
            None
        }
    }
}

/// Load the sender of a callback, registering them if needed.
///
/// Refreshes last activity without counting a message.
pub async fn load_user(
    bot: &Bot,
    from: &User,
    users: &UserRegistry,
    settings: &BotSettings,
) -> Option<StoredUser> {
    match users.record_activity(from.id.0.cast_signed()).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => touch_user(bot, from, users, settings).await,
        Err(e) => {
            error!("Failed to load user {}: {e}", from.id);
            None
        }
    }
}

/// Show a core error to the user.
///
/// Persistence failures abort the current step: the dialogue is reset and a
/// generic notice is shown.
///
/// # Errors
///
/// Returns an error if the notice cannot be sent.
pub async fn report_failure(
    bot: &Bot,
    chat_id: ChatId,
    dialogue: &ConversationDialogue,
    failure: &CoreError,
) -> Result<()> {
    if failure.is_fatal() {
        error!("Step aborted for chat {chat_id}: {failure}");
        dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
    } else {
        warn!("Operation rejected for chat {chat_id}: {failure}");
    }
    bot.send_message(chat_id, views::error_text(failure))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Edit the message behind a callback, or send a new one if it is gone.
///
/// # Errors
///
/// Returns an error if neither edit nor send succeeds.
pub async fn render(
    bot: &Bot,
    q: &CallbackQuery,
    text: impl Into<String>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let text = text.into();
    if let Some(message) = q.regular_message() {
        let mut req = bot
            .edit_message_text(message.chat.id, message.id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard.clone() {
            req = req.reply_markup(keyboard);
        }
        match req.await {
            Ok(_) => return Ok(()),
            Err(e) if e.to_string().contains("message is not modified") => return Ok(()),
            Err(e) => warn!("Failed to edit callback message, sending a new one: {e}"),
        }
    }

    let mut req = bot
        .send_message(ChatId::from(q.from.id), text)
        .parse_mode(ParseMode::Html);
    if let Some(keyboard) = keyboard {
        req = req.reply_markup(keyboard);
    }
    req.await?;
    Ok(())
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    users: Arc<UserRegistry>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    info!(
        "User {} ({}) initiated /start command.",
        user.id,
        user.display_name()
    );

    dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;

    let is_admin = users.gate().is_admin(&user);
    let name = msg
        .from
        .as_ref()
        .map_or_else(|| user.display_name(), |u| u.first_name.clone());
    bot.send_message(msg.chat.id, menu::welcome(&name, is_admin))
        .parse_mode(ParseMode::Html)
        .reply_markup(menu::main_keyboard(is_admin))
        .await?;
    Ok(())
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the help message cannot be sent.
pub async fn help(
    bot: Bot,
    chat_id: ChatId,
    user: &StoredUser,
    users: &UserRegistry,
    settings: &BotSettings,
) -> Result<()> {
    let is_admin = users.gate().is_admin(user);
    bot.send_message(
        chat_id,
        menu::help(settings.core.max_bots_per_user, is_admin),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(menu::main_keyboard(is_admin))
    .await?;
    Ok(())
}

/// Cancel handler: drops whatever flow is in progress.
///
/// # Errors
///
/// Returns an error if the dialogue cannot be reset or the reply fails.
pub async fn cancel(
    bot: Bot,
    chat_id: ChatId,
    user: &StoredUser,
    users: &UserRegistry,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
    info!("User {} cancelled the current operation", user.id);

    bot.send_message(chat_id, menu::cancelled())
        .reply_markup(menu::main_keyboard(users.gate().is_admin(user)))
        .await?;
    Ok(())
}

/// Cancel button under a prompt.
///
/// # Errors
///
/// Returns an error if the dialogue cannot be reset or the reply fails.
pub async fn cancel_from_callback(
    bot: &Bot,
    q: &CallbackQuery,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
    info!("User {} cancelled the current operation", q.from.id);
    render(bot, q, menu::cancelled(), None).await
}

/// Text that no flow expects.
///
/// # Errors
///
/// Returns an error if the reply fails.
pub async fn handle_idle_text(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    users: Arc<UserRegistry>,
) -> Result<()> {
    bot.send_message(msg.chat.id, menu::use_menu())
        .reply_markup(menu::main_keyboard(users.gate().is_admin(&user)))
        .await?;
    Ok(())
}

/// Banned users get a throttled notice and nothing else.
///
/// # Errors
///
/// Returns an error if the notice cannot be sent.
pub async fn handle_banned(
    bot: Bot,
    chat_id: ChatId,
    user_id: i64,
    cache: &DenialCache,
) -> Result<()> {
    if cache.should_send(user_id).await {
        info!("Banned user {user_id} tried to use the bot");
        bot.send_message(chat_id, menu::banned()).await?;
        cache.mark_sent(user_id).await;
    }
    Ok(())
}

/// Required channels the user has not joined yet
#[derive(Clone, Debug)]
pub struct MissingChannels(pub Vec<RequiredChannel>);

/// Channels the user still has to join, `None` when nothing is missing.
///
/// A failed channel lookup lets the user through.
pub async fn missing_channels(
    user: &StoredUser,
    channels: &ChannelRegistry,
) -> Option<MissingChannels> {
    match channels.missing_for(user).await {
        Ok(missing) if !missing.is_empty() => Some(MissingChannels(missing)),
        Ok(_) => None,
        Err(e) => {
            warn!("Membership check for user {} skipped: {e}", user.id);
            None
        }
    }
}

/// Ask the user to join the missing channels.
///
/// # Errors
///
/// Returns an error if the prompt cannot be sent.
pub async fn show_join_required(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    missing: &MissingChannels,
) -> Result<()> {
    let lang = user.language();
    bot.send_message(chat_id, channel_views::join_required(&missing.0, lang))
        .parse_mode(ParseMode::Html)
        .reply_markup(channel_views::join_keyboard(&missing.0, lang))
        .await?;
    Ok(())
}

/// "I've joined" pressed: check again.
///
/// # Errors
///
/// Returns an error if Telegram fails.
pub async fn check_membership(
    bot: &Bot,
    q: &CallbackQuery,
    user: &StoredUser,
    channels: &ChannelRegistry,
) -> Result<()> {
    let lang = user.language();
    let missing = match channels.recheck(user).await {
        Ok(missing) => missing,
        Err(e) => {
            warn!("Membership re-check for user {} skipped: {e}", user.id);
            Vec::new()
        }
    };
    if missing.is_empty() {
        info!("User {} joined every required channel", user.id);
        render(bot, q, channel_views::membership_confirmed(lang), None).await
    } else {
        render(
            bot,
            q,
            channel_views::join_required(&missing, lang),
            Some(channel_views::join_keyboard(&missing, lang)),
        )
        .await
    }
}

/// `/language` and the Language button.
///
/// # Errors
///
/// Returns an error if the picker cannot be sent.
pub async fn show_language_picker(bot: &Bot, chat_id: ChatId, user: &StoredUser) -> Result<()> {
    let current = user.language();
    bot.send_message(chat_id, menu::language_picker(current))
        .parse_mode(ParseMode::Html)
        .reply_markup(menu::language_keyboard(current))
        .await?;
    Ok(())
}

/// A language was picked.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn set_language(
    bot: &Bot,
    q: &CallbackQuery,
    user: &StoredUser,
    users: &UserRegistry,
    dialogue: &ConversationDialogue,
    lang: Language,
) -> Result<()> {
    match users.set_language(user.id, lang.code()).await {
        Ok(updated) => render(bot, q, menu::language_changed(updated.language()), None).await,
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::UserId;

    fn telegram_user() -> User {
        User {
            id: UserId(42),
            is_bot: false,
            first_name: String::new(),
            last_name: Some("Doe".to_string()),
            username: Some("jdoe".to_string()),
            language_code: Some("de".to_string()),
            is_premium: false,
            added_to_attachment_menu: false,
        }
    }

    #[test]
    fn profile_drops_empty_first_name() {
        let profile = profile_from(&telegram_user());
        assert_eq!(profile.id, 42);
        assert_eq!(profile.first_name, None);
        assert_eq!(profile.last_name.as_deref(), Some("Doe"));
        assert_eq!(profile.language_code.as_deref(), Some("de"));
    }

    #[test]
    fn commands_parse_lowercase() {
        assert!(matches!(Command::parse("/admin", "bot"), Ok(Command::Admin)));
        assert!(matches!(Command::parse("/cancel", "bot"), Ok(Command::Cancel)));
        assert!(matches!(
            Command::parse("/language", "bot"),
            Ok(Command::Language)
        ));
        assert!(Command::parse("/unknown", "bot").is_err());
    }
}
