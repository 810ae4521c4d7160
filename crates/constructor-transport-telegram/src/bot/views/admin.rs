//! Admin panel UI

use super::escape;
use super::menu::{callback_button, status_icon};
use crate::bot::callbacks::CallbackAction;
use chrono::Utc;
use constructor_core::bots::BotOverview;
use constructor_core::broadcast::{BroadcastSummary, FailureReason};
use constructor_core::models::{AdminAction, BotSubmission, Role, User};
use constructor_core::reporting::{ActivityReport, ActivityWindow, Stats};
use constructor_core::users::UserPage;
use constructor_core::utils::preview;
use teloxide::types::InlineKeyboardMarkup;

/// Characters of the body shown in confirmation and result messages.
const BODY_PREVIEW_CHARS: usize = 500;

/// Shown to non-admins.
#[must_use]
pub const fn access_denied() -> &'static str {
    "⛔️ Access denied"
}

/// Panel header.
#[must_use]
pub fn panel(user: &User, is_owner: bool) -> String {
    let rank = if is_owner { "owner" } else { "admin" };
    format!(
        "👑 <b>Admin Panel</b>\n\nSigned in as {} ({rank}).",
        escape(&user.display_name())
    )
}

/// Panel buttons.
#[must_use]
pub fn panel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            callback_button("📊 Statistics", CallbackAction::Stats),
            callback_button("📢 Broadcast", CallbackAction::Broadcast),
        ],
        vec![
            callback_button("👥 Users", CallbackAction::Users(0)),
            callback_button("🔍 Find User", CallbackAction::SearchUser),
        ],
        vec![
            callback_button("🤖 Bots", CallbackAction::Bots(0)),
            callback_button("📢 Channels", CallbackAction::Channels),
        ],
        vec![
            callback_button("📄 Export Users", CallbackAction::ExportUsers),
            callback_button("📈 Export Stats", CallbackAction::ExportStats),
        ],
        vec![callback_button("📜 Audit Log", CallbackAction::AuditLog)],
    ])
}

fn back_to_panel() -> Vec<teloxide::types::InlineKeyboardButton> {
    vec![callback_button("⬅️ Admin Panel", CallbackAction::AdminPanel)]
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Statistics snapshot.
#[must_use]
pub fn statistics(stats: &Stats, active_sessions: u64) -> String {
    let u = &stats.users;
    let b = &stats.bots;
    let br = &stats.broadcasts;
    format!(
        "📊 <b>Statistics</b>\n\n\
         <b>Users</b>\n\
         Total: {}\nActive: {} ({:.1}%)\nBanned: {}\nAdmins: {}\n\
         New today: {}\nActive 24h: {}\nActive 7d: {}\n\n\
         <b>Bots</b>\n\
         Total: {}\nRunning: {}\nStopped: {}\nValidated: {}\nPending: {}\nNew today: {}\n\n\
         <b>Broadcasts</b>\n\
         Sent: {}\nMessages delivered: {}\nFailed: {}\nSuccess rate: {:.1}%\n\n\
         Open conversations: {active_sessions}\n\
         <i>Generated {}</i>",
        u.total,
        u.active,
        u.active_rate,
        u.banned,
        u.admins,
        u.new_today,
        u.active_24h,
        u.active_week,
        b.total,
        b.running,
        b.stopped,
        b.validated,
        b.pending,
        b.new_today,
        br.count,
        br.total_sent,
        br.total_failed,
        br.success_rate,
        stats.generated_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Buttons under the statistics.
#[must_use]
pub fn statistics_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            callback_button("📅 Daily", CallbackAction::DailyStats),
            callback_button("📆 Weekly", CallbackAction::WeeklyStats),
        ],
        vec![
            callback_button("🔄 Refresh", CallbackAction::Stats),
            callback_button("📈 Export", CallbackAction::ExportStats),
        ],
        back_to_panel(),
    ])
}

/// Daily or weekly activity.
#[must_use]
pub fn activity(report: &ActivityReport) -> String {
    let title = match report.window {
        ActivityWindow::Day => "📅 <b>Last 24 hours</b>",
        ActivityWindow::Week => "📆 <b>Last 7 days</b>",
    };
    format!(
        "{title}\n\n\
         New users: {} ({:.1}/day)\nActive users: {} ({:.1}%)\n\
         New bots: {}\nBroadcasts: {}\nMessages delivered: {}\n\n\
         <i>Since {}</i>",
        report.new_users,
        report.new_users_per_day,
        report.active_users,
        report.activity_rate,
        report.new_bots,
        report.broadcasts,
        report.messages_delivered,
        report.since.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Buttons under an activity report.
#[must_use]
pub fn activity_keyboard(window: ActivityWindow) -> InlineKeyboardMarkup {
    let refresh = match window {
        ActivityWindow::Day => CallbackAction::DailyStats,
        ActivityWindow::Week => CallbackAction::WeeklyStats,
    };
    InlineKeyboardMarkup::new(vec![
        vec![
            callback_button("🔄 Refresh", refresh),
            callback_button("📊 Statistics", CallbackAction::Stats),
        ],
        back_to_panel(),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

fn user_badges(user: &User) -> &'static str {
    match (user.is_banned, user.role) {
        (true, _) => "🚫",
        (false, Role::Admin) => "👑",
        (false, Role::User) => "👤",
    }
}

/// Page header.
#[must_use]
pub fn users_page(page: &UserPage) -> String {
    if page.users.is_empty() {
        return "👥 No users yet.".to_string();
    }
    format!(
        "👥 <b>Users</b> ({} total)\n\nPage {} of {}",
        page.total_users,
        page.page + 1,
        page.total_pages
    )
}

/// One button per user plus navigation.
#[must_use]
pub fn users_page_keyboard(page: &UserPage) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = page
        .users
        .iter()
        .map(|user| {
            vec![callback_button(
                &format!("{} {}", user_badges(user), user.display_name()),
                CallbackAction::UserDetail(user.id),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.page > 0 {
        nav.push(callback_button("◀️", CallbackAction::Users(page.page - 1)));
    }
    if page.page + 1 < page.total_pages {
        nav.push(callback_button("▶️", CallbackAction::Users(page.page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(back_to_panel());
    InlineKeyboardMarkup::new(rows)
}

/// Ask for a search query.
#[must_use]
pub const fn search_prompt() -> &'static str {
    "🔍 Send a user id or @username."
}

/// Shown when the user behind a button no longer exists.
#[must_use]
pub const fn user_missing() -> &'static str {
    "⚠️ This user no longer exists."
}

/// Details of one user.
#[must_use]
pub fn user_card(user: &User, is_owner: bool) -> String {
    let role = if is_owner {
        "owner".to_string()
    } else {
        user.role.to_string()
    };
    let mut text = format!(
        "{} <b>{}</b>\n\nID: <code>{}</code>\nName: {}\nRole: {role}\nLanguage: {}\n\
         Messages: {}\nJoined: {}\nLast active: {}",
        user_badges(user),
        escape(&user.display_name()),
        user.id,
        escape(&user.full_name()),
        escape(user.language_code.as_deref().unwrap_or("-")),
        user.message_count,
        user.joined_at.format("%Y-%m-%d %H:%M UTC"),
        user.last_activity_at.format("%Y-%m-%d %H:%M UTC"),
    );
    if user.is_banned {
        text.push_str("\n\n🚫 <b>Banned</b>");
        if let Some(reason) = &user.ban_reason {
            text.push_str(&format!(": {}", escape(reason)));
        }
    }
    text
}

/// Moderation buttons for one user.
#[must_use]
pub fn user_card_keyboard(user: &User) -> InlineKeyboardMarkup {
    let role_button = match user.role {
        Role::Admin => callback_button("👤 Remove Admin", CallbackAction::Demote(user.id)),
        Role::User => callback_button("👑 Make Admin", CallbackAction::Promote(user.id)),
    };
    let ban_button = if user.is_banned {
        callback_button("✅ Unban", CallbackAction::Unban(user.id))
    } else {
        callback_button("🚫 Ban", CallbackAction::Ban(user.id))
    };
    InlineKeyboardMarkup::new(vec![
        vec![role_button, ban_button],
        vec![callback_button("⬅️ Users", CallbackAction::Users(0))],
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Hosted bots
// ─────────────────────────────────────────────────────────────────────────────

fn overview_line(bot: &BotSubmission) -> String {
    let now = Utc::now();
    let expiry = if bot.is_expired(now) {
        "⌛ expired".to_string()
    } else {
        format!("{}d left", bot.days_left(now))
    };
    format!(
        "{} <code>{}</code> @{} · owner <code>{}</code> · {expiry}",
        status_icon(bot.status),
        bot.id,
        escape(&bot.username),
        bot.owner_id
    )
}

/// Every hosted bot, one page at a time.
#[must_use]
pub fn bots_overview(overview: &BotOverview) -> String {
    if overview.total == 0 {
        return "🤖 No bots have been registered yet.".to_string();
    }
    let lines = overview
        .bots
        .iter()
        .map(overview_line)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "🤖 <b>All bots</b>\n\n\
         Total: {}\nRunning: {}\nExpired: {}\nExpiring within 7 days: {}\n\n\
         {lines}\n\nPage {} of {}",
        overview.total,
        overview.running,
        overview.expired,
        overview.expiring_soon,
        overview.page + 1,
        overview.total_pages
    )
}

/// Navigation and expiry controls.
#[must_use]
pub fn bots_overview_keyboard(overview: &BotOverview) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    let mut nav = Vec::new();
    if overview.page > 0 {
        nav.push(callback_button("◀️", CallbackAction::Bots(overview.page - 1)));
    }
    if overview.page + 1 < overview.total_pages {
        nav.push(callback_button("▶️", CallbackAction::Bots(overview.page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![
        callback_button("⏰ Extend Bot Time", CallbackAction::ExtendBot),
        callback_button("⌛ Handle Expired", CallbackAction::ExpireBots),
    ]);
    rows.push(vec![callback_button(
        "🔄 Refresh",
        CallbackAction::Bots(overview.page),
    )]);
    rows.push(back_to_panel());
    InlineKeyboardMarkup::new(rows)
}

/// Ask for `<bot id> <days>`.
#[must_use]
pub fn extend_prompt(max_days: u32) -> String {
    format!(
        "⏰ <b>Extend bot time</b>\n\n\
         Send the bot id and the number of days, for example <code>12 30</code>.\n\
         Days: 1 to {max_days}. An expired bot is extended from today."
    )
}

/// Reply after an extension.
#[must_use]
pub fn bot_extended(bot: &BotSubmission, days: u32) -> String {
    format!(
        "✅ @{} extended by {days} days, hosted until {}.",
        escape(&bot.username),
        bot.expires_at.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Result of an expiry sweep.
#[must_use]
pub fn expired_result(stopped: &[BotSubmission]) -> String {
    if stopped.is_empty() {
        return "✅ No running bots have expired.".to_string();
    }
    let names = stopped
        .iter()
        .map(|bot| format!("• @{}", escape(&bot.username)))
        .collect::<Vec<_>>()
        .join("\n");
    format!("⌛ Stopped {} expired bots:\n{names}", stopped.len())
}

/// Single button back to the bot list.
#[must_use]
pub fn back_to_bots_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![callback_button(
        "⬅️ All Bots",
        CallbackAction::Bots(0),
    )]])
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit log
// ─────────────────────────────────────────────────────────────────────────────

/// Recent admin actions, newest first.
#[must_use]
pub fn audit_log(actions: &[AdminAction]) -> String {
    if actions.is_empty() {
        return "📜 No admin actions recorded yet.".to_string();
    }
    let lines = actions
        .iter()
        .map(|action| {
            let mut line = format!(
                "{} <code>{}</code> {}",
                action.created_at.format("%m-%d %H:%M"),
                action.actor_id,
                escape(&action.action)
            );
            if let Some(target) = action.target_id {
                line.push_str(&format!(" → <code>{target}</code>"));
            }
            if let Some(details) = &action.details {
                line.push_str(&format!(" ({})", escape(&preview(details, 60))));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("📜 <b>Audit log</b>\n\n{lines}")
}

/// Buttons under the audit log.
#[must_use]
pub fn audit_log_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![callback_button("🔄 Refresh", CallbackAction::AuditLog)],
        back_to_panel(),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast
// ─────────────────────────────────────────────────────────────────────────────

/// Ask for the broadcast body.
#[must_use]
pub fn broadcast_prompt(max_len: usize) -> String {
    format!("📢 <b>Broadcast</b>\n\nSend the message text (up to {max_len} characters).")
}

/// Confirmation with a preview.
#[must_use]
pub fn broadcast_preview(body: &str, recipients: usize) -> String {
    format!(
        "📢 <b>Broadcast preview</b>\n\n{}\n\n👥 Recipients: {recipients}\n\nSend it?",
        escape(&preview(body, BODY_PREVIEW_CHARS))
    )
}

/// Keyboard for [`broadcast_preview`].
#[must_use]
pub fn broadcast_confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        callback_button("✅ Send", CallbackAction::ConfirmBroadcast),
        callback_button("❌ Cancel", CallbackAction::Cancel),
    ]])
}

/// Shown while the broadcast runs.
#[must_use]
pub fn broadcast_started(recipients: usize) -> String {
    format!("⏳ Sending to {recipients} users...")
}

/// Keyboard for [`broadcast_started`].
#[must_use]
pub fn broadcast_running_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![callback_button(
        "⏹ Stop",
        CallbackAction::StopBroadcast,
    )]])
}

/// Shown after the stop button was pressed.
#[must_use]
pub const fn broadcast_stopping() -> &'static str {
    "⏹ Stopping the broadcast. Messages already in flight will still be delivered."
}

/// Shown when a second broadcast is requested while one is running.
#[must_use]
pub const fn broadcast_already_running() -> &'static str {
    "⏳ A broadcast is already running. Stop it or wait until it finishes."
}

/// Shown when there is no one to send to.
#[must_use]
pub const fn no_recipients() -> &'static str {
    "👥 There are no users to send to."
}

/// Final report.
#[must_use]
pub fn broadcast_result(summary: &BroadcastSummary) -> String {
    let header = if summary.was_cancelled() {
        "⏹ <b>Broadcast stopped</b>"
    } else {
        "✅ <b>Broadcast finished</b>"
    };
    let mut text = format!(
        "{header}\n\nSent: {}\nFailed: {}\nTotal: {}\nSuccess rate: {:.1}%",
        summary.sent,
        summary.failed,
        summary.total,
        summary.success_rate * 100.0
    );
    if summary.skipped > 0 {
        text.push_str(&format!("\nNot sent: {}", summary.skipped));
    }

    let unreachable = summary.count_failures(|r| *r == FailureReason::Unreachable);
    let timed_out = summary.count_failures(|r| *r == FailureReason::Timeout);
    let limited = summary.count_failures(|r| matches!(r, FailureReason::RateLimited { .. }));
    if unreachable + timed_out + limited > 0 {
        text.push_str(&format!(
            "\n\nBlocked or deleted: {unreachable}\nTimed out: {timed_out}\nRate limited: {limited}"
        ));
    }
    if summary.record_id.is_none() && summary.total > 0 {
        text.push_str("\n\n⚠️ The broadcast record could not be saved.");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use constructor_core::broadcast::{DeliveryReport, SendOutcome};

    fn user(id: i64) -> User {
        User {
            id,
            username: Some(format!("user{id}")),
            first_name: Some("Test".into()),
            last_name: None,
            language_code: Some("en".into()),
            role: Role::User,
            is_active: true,
            is_banned: false,
            ban_reason: None,
            joined_at: Utc::now(),
            last_activity_at: Utc::now(),
            message_count: 1,
        }
    }

    #[test]
    fn pagination_buttons_follow_position() {
        let page = UserPage {
            users: vec![user(1), user(2)],
            page: 0,
            total_pages: 3,
            total_users: 12,
        };
        let keyboard = users_page_keyboard(&page);
        // two users, next button, back row
        assert_eq!(keyboard.inline_keyboard.len(), 4);
        assert_eq!(keyboard.inline_keyboard[2].len(), 1);

        let last = UserPage {
            page: 2,
            ..page
        };
        let keyboard = users_page_keyboard(&last);
        assert_eq!(keyboard.inline_keyboard[2][0].text, "◀️");
    }

    #[test]
    fn audit_entries_are_escaped() {
        let action = AdminAction {
            id: 1,
            actor_id: 7,
            action: "ban_user".into(),
            target_id: Some(9),
            details: Some("<spam>".into()),
            created_at: Utc::now(),
        };
        let text = audit_log(&[action]);
        assert!(text.contains("ban_user → <code>9</code> (&lt;spam&gt;)"));
        assert!(audit_log(&[]).contains("No admin actions"));
    }

    #[test]
    fn activity_titles_follow_window() {
        let report = ActivityReport {
            window: ActivityWindow::Week,
            since: Utc::now(),
            new_users: 14,
            active_users: 3,
            activity_rate: 50.0,
            new_users_per_day: 2.0,
            new_bots: 1,
            broadcasts: 0,
            messages_delivered: 0,
        };
        let text = activity(&report);
        assert!(text.contains("Last 7 days"));
        assert!(text.contains("New users: 14 (2.0/day)"));
    }

    #[test]
    fn banned_card_shows_reason() {
        let mut banned = user(5);
        banned.is_banned = true;
        banned.ban_reason = Some("spam & ads".into());
        let text = user_card(&banned, false);
        assert!(text.contains("spam &amp; ads"));
    }

    #[test]
    fn result_breaks_down_failures() {
        let summary = BroadcastSummary {
            sent: 2,
            failed: 1,
            skipped: 0,
            total: 3,
            success_rate: 2.0 / 3.0,
            completed_at: Utc::now(),
            record_id: Some(1),
            deliveries: vec![DeliveryReport {
                recipient: 2,
                outcome: SendOutcome::Failed(FailureReason::Unreachable),
            }],
        };
        let text = broadcast_result(&summary);
        assert!(text.contains("Success rate: 66.7%"));
        assert!(text.contains("Blocked or deleted: 1"));
        assert!(!text.contains("could not be saved"));
    }
}
