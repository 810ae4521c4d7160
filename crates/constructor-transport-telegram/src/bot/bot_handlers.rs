//! Creating and managing hosted bots
//!
//! Flow: "Add Bot" → token → `getMe` → confirm → registered and started.

use crate::bot::callbacks::CallbackAction;
use crate::bot::dialogue::{advance, ConversationDialogue};
use crate::bot::handlers::{render, report_failure};
use crate::bot::resilient::notify_owners;
use crate::bot::views::menu;
use crate::config::BotSettings;
use anyhow::{anyhow, Result};
use constructor_core::bots::BotRegistry;
use constructor_core::conversation::{Event, State};
use constructor_core::error::{CoreError, ValidationError};
use constructor_core::models::User as StoredUser;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

/// "Add Bot": check the limit, then ask for a token.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn begin_bot_creation(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    bots: &BotRegistry,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let owned = match bots.list_for_owner(user.id).await {
        Ok(owned) => owned.len(),
        Err(e) => return report_failure(bot, chat_id, dialogue, &e.into()).await,
    };
    let limit = bots.max_bots_per_user();
    if owned >= limit as usize {
        let full = CoreError::from(ValidationError::BotLimitReached { limit });
        return report_failure(bot, chat_id, dialogue, &full).await;
    }

    advance(dialogue, Event::BeginBotCreation).await?;
    bot.send_message(chat_id, menu::token_prompt(owned, limit))
        .parse_mode(ParseMode::Html)
        .reply_markup(menu::cancel_keyboard())
        .await?;
    Ok(())
}

/// Token received while in [`State::AwaitingToken`].
///
/// The message holding the token is deleted from the chat. A rejected token
/// keeps the flow open so the user can paste another one.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_token(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    bots: Arc<BotRegistry>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, menu::token_expected())
            .reply_markup(menu::cancel_keyboard())
            .await?;
        return Ok(());
    };

    if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
        warn!("Could not delete token message from user {}: {e}", user.id);
    }
    let progress = bot.send_message(msg.chat.id, menu::checking_token()).await?;

    match bots.validate_submission(user.id, raw).await {
        Ok((token, info)) => {
            let text = menu::confirm_bot(&info);
            advance(&dialogue, Event::TokenValidated { token, info }).await?;
            bot.edit_message_text(msg.chat.id, progress.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(menu::confirm_bot_keyboard())
                .await?;
        }
        Err(e) => {
            if let Err(e) = bot.delete_message(msg.chat.id, progress.id).await {
                warn!("Could not delete token check notice for user {}: {e}", user.id);
            }
            report_failure(&bot, msg.chat.id, &dialogue, &e).await?;
        }
    }
    Ok(())
}

/// "Register" pressed on a validated bot.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn confirm_bot(
    bot: &Bot,
    q: &CallbackQuery,
    user: &StoredUser,
    bots: &BotRegistry,
    dialogue: &ConversationDialogue,
    settings: &BotSettings,
) -> Result<()> {
    let state = dialogue
        .get_or_default()
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    let State::ConfirmingBot { token, info } = state else {
        return render(bot, q, menu::use_menu(), None).await;
    };
    advance(dialogue, Event::Confirm).await?;

    let chat_id = ChatId::from(q.from.id);
    match bots.register(user.id, token, info).await {
        Ok(registered) => {
            info!(
                "User {} registered bot {} (@{})",
                user.id, registered.id, registered.username
            );
            render(bot, q, menu::bot_registered(&registered), None).await?;

            let bot = bot.clone();
            let owners = settings.telegram.admin_user_ids();
            let text = menu::new_bot_notice(&registered, &user.display_name());
            tokio::spawn(async move {
                notify_owners(&bot, &owners, &text).await;
            });
            Ok(())
        }
        Err(e) => report_failure(bot, chat_id, dialogue, &e).await,
    }
}

/// "My Bots": list from a message.
///
/// # Errors
///
/// Returns an error if Telegram or storage fails.
pub async fn show_my_bots(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    bots: &BotRegistry,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let owned = match bots.list_for_owner(user.id).await {
        Ok(owned) => owned,
        Err(e) => return report_failure(bot, chat_id, dialogue, &e.into()).await,
    };
    bot.send_message(chat_id, menu::bot_list(&owned, bots.max_bots_per_user()))
        .parse_mode(ParseMode::Html)
        .reply_markup(menu::bot_list_keyboard(&owned))
        .await?;
    Ok(())
}

/// Owner-side bot actions from inline buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    /// Back to the list
    List,
    /// Show one bot
    Manage(i64),
    /// Start or stop
    Toggle(i64),
    /// Ask before deleting
    Delete(i64),
    /// Delete
    ConfirmDelete(i64),
}

impl BotAction {
    /// The bot action behind a callback, if it is one.
    #[must_use]
    pub const fn from_callback(action: CallbackAction) -> Option<Self> {
        match action {
            CallbackAction::MyBots => Some(Self::List),
            CallbackAction::ManageBot(id) => Some(Self::Manage(id)),
            CallbackAction::ToggleBot(id) => Some(Self::Toggle(id)),
            CallbackAction::DeleteBot(id) => Some(Self::Delete(id)),
            CallbackAction::ConfirmDeleteBot(id) => Some(Self::ConfirmDelete(id)),
            _ => None,
        }
    }
}

/// Handle a bot management button.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_bot_action(
    bot: &Bot,
    q: &CallbackQuery,
    user: &StoredUser,
    bots: &BotRegistry,
    dialogue: &ConversationDialogue,
    action: BotAction,
) -> Result<()> {
    let chat_id = ChatId::from(q.from.id);
    let outcome = match action {
        BotAction::List => bots
            .list_for_owner(user.id)
            .await
            .map_err(CoreError::from)
            .map(|owned| {
                (
                    menu::bot_list(&owned, bots.max_bots_per_user()),
                    menu::bot_list_keyboard(&owned),
                )
            }),
        BotAction::Manage(bot_id) => bots
            .get_owned(user.id, bot_id)
            .await
            .map(|b| (menu::bot_card(&b), menu::bot_card_keyboard(&b))),
        BotAction::Toggle(bot_id) => bots
            .toggle(user.id, bot_id)
            .await
            .map(|b| (menu::bot_card(&b), menu::bot_card_keyboard(&b))),
        BotAction::Delete(bot_id) => bots
            .get_owned(user.id, bot_id)
            .await
            .map(|b| (menu::confirm_delete(&b), menu::confirm_delete_keyboard(b.id))),
        BotAction::ConfirmDelete(bot_id) => bots
            .delete(user.id, bot_id)
            .await
            .map(|b| (menu::bot_deleted(&b), menu::back_to_bots_keyboard())),
    };

    match outcome {
        Ok((text, keyboard)) => render(bot, q, text, Some(keyboard)).await,
        Err(e) => report_failure(bot, chat_id, dialogue, &e).await,
    }
}
