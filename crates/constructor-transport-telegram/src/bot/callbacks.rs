//! Inline keyboard callback payloads
//!
//! Payloads stay well under Telegram's 64-byte limit.

use constructor_core::models::Language;

/// Action behind an inline button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Abandon the current flow
    Cancel,
    /// Register the bot shown for confirmation
    ConfirmBot,
    /// Show the user's bots
    MyBots,
    /// Show one bot with its controls
    ManageBot(i64),
    /// Start or stop a bot
    ToggleBot(i64),
    /// Ask before deleting a bot
    DeleteBot(i64),
    /// Delete a bot
    ConfirmDeleteBot(i64),
    /// Show the admin panel
    AdminPanel,
    /// Show statistics
    Stats,
    /// Start composing a broadcast
    Broadcast,
    /// Send the composed broadcast
    ConfirmBroadcast,
    /// Cancel a broadcast in progress
    StopBroadcast,
    /// Show a page of users
    Users(u32),
    /// Start a user search
    SearchUser,
    /// Show one user with admin controls
    UserDetail(i64),
    /// Ban a user
    Ban(i64),
    /// Lift a ban
    Unban(i64),
    /// Grant the admin role
    Promote(i64),
    /// Revoke the admin role
    Demote(i64),
    /// Send the user list as CSV
    ExportUsers,
    /// Send statistics as CSV
    ExportStats,
    /// Activity of the last 24 hours
    DailyStats,
    /// Activity of the last 7 days
    WeeklyStats,
    /// Show a page of every hosted bot
    Bots(u32),
    /// Ask for `<bot id> <days>`
    ExtendBot,
    /// Stop bots whose hosting period is over
    ExpireBots,
    /// Show the required channels
    Channels,
    /// Ask for a channel to require
    AddChannel,
    /// Stop requiring a channel
    RemoveChannel(i64),
    /// Show recent admin actions
    AuditLog,
    /// Re-run the channel membership check
    CheckMembership,
    /// Show the language picker
    Languages,
    /// Pick a language
    SetLanguage(Language),
}

impl CallbackAction {
    /// Serialize into callback data.
    #[must_use]
    pub fn encode(self) -> String {
        match self {
            Self::Cancel => "cancel".to_string(),
            Self::ConfirmBot => "bot:ok".to_string(),
            Self::MyBots => "bot:list".to_string(),
            Self::ManageBot(id) => format!("bot:m:{id}"),
            Self::ToggleBot(id) => format!("bot:t:{id}"),
            Self::DeleteBot(id) => format!("bot:d:{id}"),
            Self::ConfirmDeleteBot(id) => format!("bot:dd:{id}"),
            Self::AdminPanel => "adm:panel".to_string(),
            Self::Stats => "adm:stats".to_string(),
            Self::Broadcast => "adm:bc".to_string(),
            Self::ConfirmBroadcast => "adm:bc:ok".to_string(),
            Self::StopBroadcast => "adm:bc:stop".to_string(),
            Self::Users(page) => format!("adm:u:{page}"),
            Self::SearchUser => "adm:search".to_string(),
            Self::UserDetail(id) => format!("adm:ud:{id}"),
            Self::Ban(id) => format!("adm:ban:{id}"),
            Self::Unban(id) => format!("adm:unban:{id}"),
            Self::Promote(id) => format!("adm:up:{id}"),
            Self::Demote(id) => format!("adm:down:{id}"),
            Self::ExportUsers => "adm:xu".to_string(),
            Self::ExportStats => "adm:xs".to_string(),
            Self::DailyStats => "adm:st:d".to_string(),
            Self::WeeklyStats => "adm:st:w".to_string(),
            Self::Bots(page) => format!("adm:b:{page}"),
            Self::ExtendBot => "adm:ext".to_string(),
            Self::ExpireBots => "adm:exp".to_string(),
            Self::Channels => "adm:ch".to_string(),
            Self::AddChannel => "adm:ch:add".to_string(),
            Self::RemoveChannel(chat_id) => format!("adm:ch:rm:{chat_id}"),
            Self::AuditLog => "adm:log".to_string(),
            Self::CheckMembership => "join:check".to_string(),
            Self::Languages => "lang".to_string(),
            Self::SetLanguage(lang) => format!("lang:{}", lang.code()),
        }
    }

    /// Parse callback data. Unknown or malformed payloads give `None`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "cancel" => Self::Cancel,
            "bot:ok" => Self::ConfirmBot,
            "bot:list" => Self::MyBots,
            "adm:panel" => Self::AdminPanel,
            "adm:stats" => Self::Stats,
            "adm:bc" => Self::Broadcast,
            "adm:bc:ok" => Self::ConfirmBroadcast,
            "adm:bc:stop" => Self::StopBroadcast,
            "adm:search" => Self::SearchUser,
            "adm:xu" => Self::ExportUsers,
            "adm:xs" => Self::ExportStats,
            "adm:st:d" => Self::DailyStats,
            "adm:st:w" => Self::WeeklyStats,
            "adm:ext" => Self::ExtendBot,
            "adm:exp" => Self::ExpireBots,
            "adm:ch" => Self::Channels,
            "adm:ch:add" => Self::AddChannel,
            "adm:log" => Self::AuditLog,
            "join:check" => Self::CheckMembership,
            "lang" => Self::Languages,
            _ => return Self::parse_with_arg(data),
        };
        Some(action)
    }

    fn parse_with_arg(data: &str) -> Option<Self> {
        let (prefix, arg) = data.rsplit_once(':')?;
        match prefix {
            "adm:u" => return arg.parse().ok().map(Self::Users),
            "adm:b" => return arg.parse().ok().map(Self::Bots),
            "lang" => return Language::from_code(arg).map(Self::SetLanguage),
            _ => {}
        }

        let id: i64 = arg.parse().ok()?;
        let action = match prefix {
            "bot:m" => Self::ManageBot(id),
            "bot:t" => Self::ToggleBot(id),
            "bot:d" => Self::DeleteBot(id),
            "bot:dd" => Self::ConfirmDeleteBot(id),
            "adm:ud" => Self::UserDetail(id),
            "adm:ban" => Self::Ban(id),
            "adm:unban" => Self::Unban(id),
            "adm:up" => Self::Promote(id),
            "adm:down" => Self::Demote(id),
            "adm:ch:rm" => Self::RemoveChannel(id),
            _ => return None,
        };
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_fit_telegram_limit() {
        let longest = CallbackAction::ConfirmDeleteBot(i64::MIN).encode();
        assert!(longest.len() <= 64);
    }

    #[test]
    fn parses_argument_payloads() {
        assert_eq!(
            CallbackAction::parse("adm:ban:12345"),
            Some(CallbackAction::Ban(12345))
        );
        assert_eq!(CallbackAction::parse("adm:u:3"), Some(CallbackAction::Users(3)));
        assert_eq!(
            CallbackAction::parse("bot:dd:7"),
            Some(CallbackAction::ConfirmDeleteBot(7))
        );
        assert_eq!(
            CallbackAction::parse(&CallbackAction::Demote(-5).encode()),
            Some(CallbackAction::Demote(-5))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("adm:ban:abc"), None);
        assert_eq!(CallbackAction::parse("adm:u:-1"), None);
        assert_eq!(CallbackAction::parse("nope:1"), None);
    }

    #[test]
    fn channel_and_language_payloads() {
        assert_eq!(
            CallbackAction::parse(&CallbackAction::RemoveChannel(-1_001_234_567_890).encode()),
            Some(CallbackAction::RemoveChannel(-1_001_234_567_890))
        );
        assert_eq!(CallbackAction::parse("adm:ch:add"), Some(CallbackAction::AddChannel));
        assert_eq!(
            CallbackAction::parse("lang:uz"),
            Some(CallbackAction::SetLanguage(Language::Uz))
        );
        assert_eq!(CallbackAction::parse("lang:de"), None);
        assert_eq!(CallbackAction::parse("adm:b:2"), Some(CallbackAction::Bots(2)));
    }
}
