//! Required channels: the join prompt and the admin list

use super::escape;
use super::menu::callback_button;
use crate::bot::callbacks::CallbackAction;
use constructor_core::models::{Language, RequiredChannel};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn channel_line(channel: &RequiredChannel) -> String {
    match &channel.username {
        Some(username) => format!("• {} (@{})", escape(&channel.title), escape(username)),
        None => format!("• {}", escape(&channel.title)),
    }
}

fn channel_lines(channels: &[RequiredChannel]) -> String {
    channels
        .iter()
        .map(channel_line)
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Join prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Ask a user to join the channels they are missing.
#[must_use]
pub fn join_required(missing: &[RequiredChannel], lang: Language) -> String {
    let list = channel_lines(missing);
    match lang {
        Language::En => format!(
            "📢 To use this bot, please join our channels:\n\n{list}\n\n\
             After joining, press the button below."
        ),
        Language::Ru => format!(
            "📢 Чтобы пользоваться ботом, подпишитесь на наши каналы:\n\n{list}\n\n\
             После подписки нажмите кнопку ниже."
        ),
        Language::Uz => format!(
            "📢 Botdan foydalanish uchun kanallarimizga obuna bo'ling:\n\n{list}\n\n\
             Obuna bo'lgach, quyidagi tugmani bosing."
        ),
    }
}

/// Link buttons for public channels plus the re-check button.
#[must_use]
pub fn join_keyboard(missing: &[RequiredChannel], lang: Language) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = missing
        .iter()
        .filter_map(|channel| {
            let url = channel.url()?.parse().ok()?;
            Some(vec![InlineKeyboardButton::url(
                format!("📢 {}", channel.title),
                url,
            )])
        })
        .collect();
    let joined = match lang {
        Language::En => "✅ I've joined",
        Language::Ru => "✅ Я подписался",
        Language::Uz => "✅ Obuna bo'ldim",
    };
    rows.push(vec![callback_button(joined, CallbackAction::CheckMembership)]);
    InlineKeyboardMarkup::new(rows)
}

/// Shown once every channel is joined.
#[must_use]
pub const fn membership_confirmed(lang: Language) -> &'static str {
    match lang {
        Language::En => "✅ Thank you! You can use the bot now. Send /start.",
        Language::Ru => "✅ Спасибо! Теперь вы можете пользоваться ботом. Отправьте /start.",
        Language::Uz => "✅ Rahmat! Endi botdan foydalanishingiz mumkin. /start yuboring.",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin list
// ─────────────────────────────────────────────────────────────────────────────

/// Required channels for the admin panel.
#[must_use]
pub fn channel_list(channels: &[RequiredChannel]) -> String {
    if channels.is_empty() {
        return "📢 <b>Required channels</b>\n\nNone. Everyone can use the bot.".to_string();
    }
    let lines = channels
        .iter()
        .map(|channel| format!("{} <code>{}</code>", channel_line(channel), channel.chat_id))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "📢 <b>Required channels</b> ({})\n\n{lines}\n\nUsers must join all of them.",
        channels.len()
    )
}

/// Remove buttons, add button and navigation.
#[must_use]
pub fn channel_list_keyboard(channels: &[RequiredChannel]) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = channels
        .iter()
        .map(|channel| {
            vec![callback_button(
                &format!("❌ {}", channel.title),
                CallbackAction::RemoveChannel(channel.chat_id),
            )]
        })
        .collect();
    rows.push(vec![callback_button("➕ Add Channel", CallbackAction::AddChannel)]);
    rows.push(vec![callback_button(
        "⬅️ Admin Panel",
        CallbackAction::AdminPanel,
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Ask for a channel.
#[must_use]
pub const fn channel_prompt() -> &'static str {
    "📢 Send the channel as @username, a t.me link or a <code>-100...</code> id.\n\n\
     The platform bot must be an admin of the channel to check members."
}

/// Reply after a channel was added.
#[must_use]
pub fn channel_added(channel: &RequiredChannel) -> String {
    format!("✅ Users now have to join:\n{}", channel_line(channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(chat_id: i64, username: Option<&str>) -> RequiredChannel {
        RequiredChannel {
            chat_id,
            username: username.map(str::to_string),
            title: "News <daily>".into(),
            added_by: 1,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn private_channels_get_no_link_button() {
        let missing = [channel(-1001, Some("news_channel")), channel(-1002, None)];
        let keyboard = join_keyboard(&missing, Language::En);
        // one link, one re-check button
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[1][0].text, "✅ I've joined");
    }

    #[test]
    fn join_prompt_follows_language() {
        let missing = [channel(-1001, Some("news_channel"))];
        assert!(join_required(&missing, Language::Ru).contains("подпишитесь"));
        let text = join_required(&missing, Language::En);
        assert!(text.contains("News &lt;daily&gt; (@news_channel)"));
    }

    #[test]
    fn admin_list_shows_ids() {
        let text = channel_list(&[channel(-1001, None)]);
        assert!(text.contains("<code>-1001</code>"));
        assert!(channel_list(&[]).contains("None"));
    }
}
