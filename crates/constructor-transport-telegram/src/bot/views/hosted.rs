//! Replies of the bots users create

use super::escape;

/// `/start` reply.
#[must_use]
pub fn greeting(name: &str, owner_id: i64) -> String {
    format!(
        "👋 Hi! I am <b>{}</b>.\n\nI was created by <a href=\"tg://user?id={owner_id}\">my owner</a> on the bot constructor platform.\n\nSend /help to see what I can do.",
        escape(name)
    )
}

/// `/help` reply.
#[must_use]
pub fn help(name: &str) -> String {
    format!(
        "ℹ️ <b>{}</b>\n\n/start - greeting\n/help - this message",
        escape(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_mentions_owner() {
        let text = greeting("Echo & Co", 42);
        assert!(text.contains("Echo &amp; Co"));
        assert!(text.contains("tg://user?id=42"));
    }
}
