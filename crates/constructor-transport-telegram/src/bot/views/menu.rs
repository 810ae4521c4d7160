//! Main menu and bot management UI

use super::escape;
use crate::bot::callbacks::CallbackAction;
use chrono::Utc;
use constructor_core::models::{BotStatus, BotSubmission, Language};
use constructor_core::validator::BotInfo;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Reply keyboard
// ─────────────────────────────────────────────────────────────────────────────

/// Reply keyboard buttons of the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButton {
    /// List own bots
    MyBots,
    /// Start the bot creation flow
    AddBot,
    /// Show help
    Help,
    /// Open the admin panel
    AdminPanel,
    /// Pick the interface language
    Language,
}

impl MenuButton {
    /// Button label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MyBots => "🤖 My Bots",
            Self::AddBot => "➕ Add Bot",
            Self::Help => "❓ Help",
            Self::AdminPanel => "👑 Admin Panel",
            Self::Language => "🌐 Language",
        }
    }

    /// Match a message text against the button labels.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        [
            Self::MyBots,
            Self::AddBot,
            Self::Help,
            Self::Language,
            Self::AdminPanel,
        ]
            .into_iter()
            .find(|button| button.label() == text.trim())
    }
}

/// Create the main menu keyboard
///
/// # Examples
///
/// ```
/// use constructor_transport_telegram::bot::views::menu::main_keyboard;
/// let keyboard = main_keyboard(false);
/// assert_eq!(keyboard.keyboard.len(), 2);
/// ```
#[must_use]
pub fn main_keyboard(is_admin: bool) -> KeyboardMarkup {
    let mut keyboard = vec![
        vec![
            KeyboardButton::new(MenuButton::MyBots.label()),
            KeyboardButton::new(MenuButton::AddBot.label()),
        ],
        vec![
            KeyboardButton::new(MenuButton::Help.label()),
            KeyboardButton::new(MenuButton::Language.label()),
        ],
    ];
    if is_admin {
        keyboard.push(vec![KeyboardButton::new(MenuButton::AdminPanel.label())]);
    }
    KeyboardMarkup::new(keyboard).resize_keyboard()
}

/// Inline keyboard with a single cancel button
#[must_use]
pub fn cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![callback_button(
        "❌ Cancel",
        CallbackAction::Cancel,
    )]])
}

pub(crate) fn callback_button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.encode())
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// `/start` reply.
#[must_use]
pub fn welcome(name: &str, is_admin: bool) -> String {
    let admin_hint = if is_admin {
        "\n\n👑 You have admin access: use /admin or the Admin Panel button."
    } else {
        ""
    };
    format!(
        "🌟 <b>Welcome, {}!</b>\n\n\
         Create and host your own Telegram bots here:\n\
         • ➕ Add a bot with a token from @BotFather\n\
         • 🤖 Start, stop or delete your bots\n\n\
         Use the buttons below to navigate.{admin_hint}",
        escape(name)
    )
}

/// `/help` reply.
#[must_use]
pub fn help(max_bots: u32, is_admin: bool) -> String {
    let mut text = format!(
        "📋 <b>Help</b>\n\n\
         <b>Adding a bot</b>\n\
         1. Open @BotFather and create a bot with /newbot\n\
         2. Copy the token it gives you\n\
         3. Press ➕ Add Bot and paste the token\n\n\
         You can host up to {max_bots} bots.\n\n\
         /start - main menu\n\
         /cancel - cancel the current operation\n\
         /language - change the language\n\
         /help - this message"
    );
    if is_admin {
        text.push_str("\n/admin - admin panel");
    }
    text
}

/// Reply to `/cancel` and the cancel button.
#[must_use]
pub const fn cancelled() -> &'static str {
    "❌ Operation cancelled."
}

/// Reply to text that no flow expects.
#[must_use]
pub const fn use_menu() -> &'static str {
    "Please use the menu buttons below."
}

/// Shown to banned users.
#[must_use]
pub const fn banned() -> &'static str {
    "🚫 Your access to this bot has been restricted."
}

// ─────────────────────────────────────────────────────────────────────────────
// Language
// ─────────────────────────────────────────────────────────────────────────────

/// Language picker header.
#[must_use]
pub fn language_picker(current: Language) -> String {
    format!(
        "🌐 <b>Language</b>\n\nCurrent: {}\n\nChoose your language:",
        current.label()
    )
}

/// One button per supported language, the current one marked.
#[must_use]
pub fn language_keyboard(current: Language) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(Language::ALL.into_iter().map(|lang| {
        let label = if lang == current {
            format!("✅ {}", lang.label())
        } else {
            lang.label().to_string()
        };
        vec![callback_button(&label, CallbackAction::SetLanguage(lang))]
    }))
}

/// Confirmation in the chosen language.
#[must_use]
pub const fn language_changed(lang: Language) -> &'static str {
    match lang {
        Language::En => "✅ Language set to English.",
        Language::Ru => "✅ Язык изменён на русский.",
        Language::Uz => "✅ Til o'zbek tiliga o'zgartirildi.",
    }
}

/// New-user notice for owners.
#[must_use]
pub fn new_user_notice(display_name: &str, user_id: i64) -> String {
    format!(
        "👤 New user: {} (<code>{user_id}</code>)",
        escape(display_name)
    )
}

/// New-bot notice for owners.
#[must_use]
pub fn new_bot_notice(bot: &BotSubmission, owner_name: &str) -> String {
    format!(
        "🤖 New bot @{} registered by {} (<code>{}</code>)",
        escape(&bot.username),
        escape(owner_name),
        bot.owner_id
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Bot creation
// ─────────────────────────────────────────────────────────────────────────────

/// Ask for a token.
#[must_use]
pub fn token_prompt(owned: usize, limit: u32) -> String {
    format!(
        "🔑 <b>Add a bot</b> ({owned}/{limit})\n\n\
         Send the token of your bot. You get it from @BotFather after /newbot."
    )
}

/// Reply to a non-text message while a token is expected.
#[must_use]
pub const fn token_expected() -> &'static str {
    "Please send the token as a text message, or press Cancel."
}

/// Shown while `getMe` runs.
#[must_use]
pub const fn checking_token() -> &'static str {
    "⏳ Checking the token..."
}

/// Ask to confirm a validated bot.
#[must_use]
pub fn confirm_bot(info: &BotInfo) -> String {
    format!(
        "✅ <b>Token is valid</b>\n\nName: {}\nUsername: @{}\n\nRegister and start this bot?",
        escape(&info.name),
        escape(&info.username)
    )
}

/// Keyboard for [`confirm_bot`].
#[must_use]
pub fn confirm_bot_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        callback_button("✅ Register", CallbackAction::ConfirmBot),
        callback_button("❌ Cancel", CallbackAction::Cancel),
    ]])
}

/// Reply after registration.
#[must_use]
pub fn bot_registered(bot: &BotSubmission) -> String {
    let state = if bot.status == BotStatus::Running {
        "It is running now, try it out."
    } else {
        "It could not be started yet; use 🤖 My Bots to try again."
    };
    format!("🎉 <b>@{}</b> is registered. {state}", escape(&bot.username))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bot management
// ─────────────────────────────────────────────────────────────────────────────

/// Emoji for a status.
#[must_use]
pub const fn status_icon(status: BotStatus) -> &'static str {
    match status {
        BotStatus::Pending => "⏳",
        BotStatus::Validated => "🟡",
        BotStatus::Running => "🟢",
        BotStatus::Stopped => "🔴",
    }
}

/// Header for the bot list.
#[must_use]
pub fn bot_list(bots: &[BotSubmission], limit: u32) -> String {
    if bots.is_empty() {
        return "🤖 You have no bots yet. Press ➕ Add Bot to create one.".to_string();
    }
    format!(
        "🤖 <b>Your bots</b> ({}/{limit})\n\nSelect a bot to manage it.",
        bots.len()
    )
}

/// One button per bot.
#[must_use]
pub fn bot_list_keyboard(bots: &[BotSubmission]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(bots.iter().map(|bot| {
        vec![callback_button(
            &format!("{} @{}", status_icon(bot.status), bot.username),
            CallbackAction::ManageBot(bot.id),
        )]
    }))
}

/// Hosting period line of a bot.
#[must_use]
pub fn expiry_line(bot: &BotSubmission) -> String {
    let now = Utc::now();
    if bot.is_expired(now) {
        format!(
            "⌛ Expired on {}",
            bot.expires_at.format("%Y-%m-%d %H:%M UTC")
        )
    } else {
        format!(
            "Hosted until: {} ({} days left)",
            bot.expires_at.format("%Y-%m-%d %H:%M UTC"),
            bot.days_left(now)
        )
    }
}

/// Details of one bot.
#[must_use]
pub fn bot_card(bot: &BotSubmission) -> String {
    format!(
        "🤖 <b>{}</b> (@{})\n\nStatus: {} {}\nAdded: {}\nUpdated: {}\n{}",
        escape(&bot.name),
        escape(&bot.username),
        status_icon(bot.status),
        bot.status,
        bot.created_at.format("%Y-%m-%d %H:%M UTC"),
        bot.updated_at.format("%Y-%m-%d %H:%M UTC"),
        expiry_line(bot),
    )
}

/// Controls for one bot.
#[must_use]
pub fn bot_card_keyboard(bot: &BotSubmission) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    match bot.status {
        BotStatus::Running => rows.push(vec![callback_button(
            "⏹ Stop",
            CallbackAction::ToggleBot(bot.id),
        )]),
        BotStatus::Validated | BotStatus::Stopped if !bot.is_expired(Utc::now()) => {
            rows.push(vec![callback_button(
                "▶️ Start",
                CallbackAction::ToggleBot(bot.id),
            )]);
        }
        _ => {}
    }
    rows.push(vec![callback_button(
        "🗑 Delete",
        CallbackAction::DeleteBot(bot.id),
    )]);
    rows.push(vec![callback_button("⬅️ Back", CallbackAction::MyBots)]);
    InlineKeyboardMarkup::new(rows)
}

/// Ask before deleting.
#[must_use]
pub fn confirm_delete(bot: &BotSubmission) -> String {
    format!(
        "⚠️ Delete @{}? The bot will be stopped and removed from the platform.",
        escape(&bot.username)
    )
}

/// Keyboard for [`confirm_delete`].
#[must_use]
pub fn confirm_delete_keyboard(bot_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        callback_button("🗑 Delete", CallbackAction::ConfirmDeleteBot(bot_id)),
        callback_button("⬅️ Back", CallbackAction::ManageBot(bot_id)),
    ]])
}

/// Reply after deletion.
#[must_use]
pub fn bot_deleted(bot: &BotSubmission) -> String {
    format!("🗑 @{} was deleted.", escape(&bot.username))
}

/// Owner notice for a bot whose hosting period ran out.
#[must_use]
pub fn bot_expired_notice(bot: &BotSubmission) -> String {
    format!(
        "⌛ Your bot @{} has expired and was stopped. Contact an admin to extend it.",
        escape(&bot.username)
    )
}

/// Owner notice for an extended bot.
#[must_use]
pub fn bot_extended_notice(bot: &BotSubmission, days: u32) -> String {
    format!(
        "🎉 Your bot @{} was extended by {days} days. It is now hosted until {}.",
        escape(&bot.username),
        bot.expires_at.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Single button back to the bot list.
#[must_use]
pub fn back_to_bots_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![callback_button(
        "⬅️ My Bots",
        CallbackAction::MyBots,
    )]])
}
