//! Bot token parsing and the validation contract
//!
//! A token is checked locally for shape first, then handed to a
//! [`TokenValidator`] which asks Telegram who the bot is.

use crate::error::ValidationError;
use async_trait::async_trait;
use lazy_regex::regex_is_match;
use sha2::{Digest, Sha256};
use std::fmt;

/// Telegram bot credential, `<bot id>:<secret>`
///
/// `Debug` and `Display` never print the secret part.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Parse a token typed by a user.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedToken`] if the text is not shaped
    /// like a bot token.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if regex_is_match!(r"^[0-9]{8,10}:[A-Za-z0-9_-]{35}$", raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::MalformedToken)
        }
    }

    /// Wrap a token loaded from storage without re-checking it.
    #[must_use]
    pub const fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// The full secret, for API calls and storage only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Bot id prefix of the token.
    #[must_use]
    pub fn bot_id_part(&self) -> &str {
        self.0.split_once(':').map_or("", |(id, _)| id)
    }

    /// Stable hash used for duplicate detection.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BotToken({}:***)", self.bot_id_part())
    }
}

impl fmt::Display for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:***", self.bot_id_part())
    }
}

/// Identity of a bot as reported by `getMe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotInfo {
    /// Telegram id of the bot account
    pub id: i64,
    /// Display name
    pub name: String,
    /// `@username` without the at sign
    pub username: String,
}

/// Interface for checking a token against Telegram
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Resolve the bot behind `token`.
    ///
    /// Network failures, timeouts and API rejections are all reported as
    /// [`ValidationError`]; implementations do not retry.
    async fn validate(&self, token: &BotToken) -> Result<BotInfo, ValidationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1";

    #[test]
    fn accepts_well_formed_token() {
        let token = BotToken::parse(&format!("  {TOKEN}\n")).expect("valid token");
        assert_eq!(token.expose(), TOKEN);
        assert_eq!(token.bot_id_part(), "123456789");
    }

    #[test]
    fn rejects_malformed_tokens() {
        for raw in [
            "",
            "hello",
            "123456789",
            "1234567:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1",
            "123456789:short",
            "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsa!1",
        ] {
            assert_eq!(BotToken::parse(raw), Err(ValidationError::MalformedToken), "{raw}");
        }
    }

    #[test]
    fn debug_and_display_hide_secret() {
        let token = BotToken::parse(TOKEN).expect("valid token");
        assert!(!format!("{token:?}").contains("AAHdq"));
        assert_eq!(token.to_string(), "123456789:***");
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = BotToken::parse(TOKEN).expect("valid token");
        let b = BotToken::parse("123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw2")
            .expect("valid token");
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
