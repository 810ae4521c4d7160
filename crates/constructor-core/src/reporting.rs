//! Admin reporting
//!
//! Read-only statistics over users, bots and broadcasts, and CSV exports
//! for spreadsheets (UTF-8 with a byte order mark).

use crate::models::{BotStatus, BotSubmission, BroadcastRecord, Role, User};
use crate::storage::{StorageError, StorageProvider};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while building a report
#[derive(Error, Debug)]
pub enum ReportError {
    /// Loading data failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Writing CSV failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Flushing the CSV buffer failed
    #[error("CSV flush error: {0}")]
    Flush(String),
}

/// User counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    /// Registered users
    pub total: u64,
    /// Active and not banned
    pub active: u64,
    /// Banned
    pub banned: u64,
    /// Stored admins (promoted or owners)
    pub admins: u64,
    /// Joined since midnight UTC
    pub new_today: u64,
    /// Seen in the last 24 hours
    pub active_24h: u64,
    /// Seen in the last 7 days
    pub active_week: u64,
    /// Share of active users, in percent
    pub active_rate: f64,
}

/// Hosted bot counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotStats {
    /// All submissions
    pub total: u64,
    /// Not yet validated
    pub pending: u64,
    /// Validated, never started
    pub validated: u64,
    /// Serving updates
    pub running: u64,
    /// Stopped
    pub stopped: u64,
    /// Submitted since midnight UTC
    pub new_today: u64,
}

/// Broadcast counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastStats {
    /// Completed broadcasts
    pub count: u64,
    /// Messages delivered over all broadcasts
    pub total_sent: u64,
    /// Messages not delivered over all broadcasts
    pub total_failed: u64,
    /// Delivered share over all broadcasts, in percent
    pub success_rate: f64,
}

/// Platform statistics snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Users
    pub users: UserStats,
    /// Hosted bots
    pub bots: BotStats,
    /// Broadcasts
    pub broadcasts: BroadcastStats,
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    part as f64 / whole.max(1) as f64 * 100.0
}

fn count<T>(items: &[T], predicate: impl Fn(&T) -> bool) -> u64 {
    items.iter().filter(|item| predicate(item)).count() as u64
}

fn non_negative(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

impl Stats {
    /// Compute statistics from loaded records.
    #[must_use]
    pub fn from_records(
        users: &[User],
        bots: &[BotSubmission],
        broadcasts: &[BroadcastRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let total = users.len() as u64;
        let active = count(users, User::is_recipient);
        let user_stats = UserStats {
            total,
            active,
            banned: count(users, |u| u.is_banned),
            admins: count(users, |u| u.role == Role::Admin),
            new_today: count(users, |u| u.joined_at.date_naive() == today),
            active_24h: count(users, |u| u.last_activity_at >= day_ago),
            active_week: count(users, |u| u.last_activity_at >= week_ago),
            active_rate: percent(active, total),
        };

        let with_status = |status: BotStatus| count(bots, |b| b.status == status);
        let bot_stats = BotStats {
            total: bots.len() as u64,
            pending: with_status(BotStatus::Pending),
            validated: with_status(BotStatus::Validated),
            running: with_status(BotStatus::Running),
            stopped: with_status(BotStatus::Stopped),
            new_today: count(bots, |b| b.created_at.date_naive() == today),
        };

        let total_sent: u64 = broadcasts.iter().map(|b| non_negative(b.sent_count)).sum();
        let total_failed: u64 = broadcasts.iter().map(|b| non_negative(b.failed_count)).sum();
        let broadcast_stats = BroadcastStats {
            count: broadcasts.len() as u64,
            total_sent,
            total_failed,
            success_rate: if total_sent + total_failed == 0 {
                0.0
            } else {
                percent(total_sent, total_sent + total_failed)
            },
        };

        Self {
            users: user_stats,
            bots: bot_stats,
            broadcasts: broadcast_stats,
            generated_at: now,
        }
    }
}

/// Period covered by an [`ActivityReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityWindow {
    /// Last 24 hours
    Day,
    /// Last 7 days
    Week,
}

impl ActivityWindow {
    /// Length of the window.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
        }
    }

    fn days(self) -> u64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
        }
    }
}

/// What happened on the platform during a window
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityReport {
    /// Period covered
    pub window: ActivityWindow,
    /// Start of the period
    pub since: DateTime<Utc>,
    /// Users who joined
    pub new_users: u64,
    /// Users seen
    pub active_users: u64,
    /// Share of all users seen, in percent
    pub activity_rate: f64,
    /// Users who joined, per day
    pub new_users_per_day: f64,
    /// Bots submitted
    pub new_bots: u64,
    /// Broadcasts completed
    pub broadcasts: u64,
    /// Broadcast messages delivered
    pub messages_delivered: u64,
}

impl ActivityReport {
    /// Compute the report from loaded records.
    #[must_use]
    pub fn from_records(
        window: ActivityWindow,
        users: &[User],
        bots: &[BotSubmission],
        broadcasts: &[BroadcastRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let since = now - window.duration();
        let new_users = count(users, |u| u.joined_at >= since);
        let active_users = count(users, |u| u.last_activity_at >= since);
        let recent: Vec<&BroadcastRecord> =
            broadcasts.iter().filter(|b| b.created_at >= since).collect();

        #[allow(clippy::cast_precision_loss)]
        let new_users_per_day = new_users as f64 / window.days() as f64;
        Self {
            window,
            since,
            new_users,
            active_users,
            activity_rate: percent(active_users, users.len() as u64),
            new_users_per_day,
            new_bots: count(bots, |b| b.created_at >= since),
            broadcasts: recent.len() as u64,
            messages_delivered: recent.iter().map(|b| non_negative(b.sent_count)).sum(),
        }
    }
}

/// Load every record and compute an activity report.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn compute_activity(
    storage: &dyn StorageProvider,
    window: ActivityWindow,
) -> Result<ActivityReport, StorageError> {
    let users = storage.all_users().await?;
    let bots = storage.all_bots().await?;
    let broadcasts = storage.list_broadcasts().await?;
    Ok(ActivityReport::from_records(
        window,
        &users,
        &bots,
        &broadcasts,
        Utc::now(),
    ))
}

/// Load every record and compute a statistics snapshot.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn compute_statistics(storage: &dyn StorageProvider) -> Result<Stats, StorageError> {
    let users = storage.all_users().await?;
    let bots = storage.all_bots().await?;
    let broadcasts = storage.list_broadcasts().await?;
    Ok(Stats::from_records(&users, &bots, &broadcasts, Utc::now()))
}

fn status_label(user: &User) -> &'static str {
    if user.is_banned {
        "Banned"
    } else if user.is_active {
        "Active"
    } else {
        "Inactive"
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ReportError> {
    let mut data = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.to_string()))?;
    let mut out = Vec::with_capacity(UTF8_BOM.len() + data.len());
    out.extend_from_slice(UTF8_BOM);
    out.append(&mut data);
    Ok(out)
}

/// Export users as CSV, one row per user.
///
/// # Errors
///
/// Returns an error if a row cannot be written.
pub fn export_users_csv(users: &[User], now: DateTime<Utc>) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "User ID",
        "Username",
        "First Name",
        "Last Name",
        "Full Name",
        "Role",
        "Status",
        "Is Admin",
        "Is Active",
        "Is Banned",
        "Join Date",
        "Last Activity",
        "Message Count",
        "Days Since Join",
        "Messages Per Day",
    ])?;

    for user in users {
        let days = (now - user.joined_at).num_days().max(0);
        #[allow(clippy::cast_precision_loss)]
        let per_day = user.message_count as f64 / days.max(1) as f64;
        writer.write_record([
            user.id.to_string(),
            user.username
                .as_ref()
                .map(|u| format!("@{u}"))
                .unwrap_or_default(),
            user.first_name.clone().unwrap_or_default(),
            user.last_name.clone().unwrap_or_default(),
            user.full_name(),
            user.role.to_string(),
            status_label(user).to_string(),
            yes_no(user.role == Role::Admin).to_string(),
            yes_no(user.is_active).to_string(),
            yes_no(user.is_banned).to_string(),
            user.joined_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            user.last_activity_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            user.message_count.to_string(),
            days.to_string(),
            format!("{per_day:.2}"),
        ])?;
    }

    finish(writer)
}

/// Export a statistics snapshot as `Metric,Value` CSV.
///
/// # Errors
///
/// Returns an error if a row cannot be written.
pub fn export_stats_csv(stats: &Stats) -> Result<Vec<u8>, ReportError> {
    let rows: [(&str, String); 19] = [
        ("Total Users", stats.users.total.to_string()),
        ("Active Users", stats.users.active.to_string()),
        ("Banned Users", stats.users.banned.to_string()),
        ("Admins", stats.users.admins.to_string()),
        ("New Users Today", stats.users.new_today.to_string()),
        ("Active Last 24h", stats.users.active_24h.to_string()),
        ("Active Last 7 Days", stats.users.active_week.to_string()),
        ("Active Rate %", format!("{:.1}", stats.users.active_rate)),
        ("Total Bots", stats.bots.total.to_string()),
        ("Pending Bots", stats.bots.pending.to_string()),
        ("Validated Bots", stats.bots.validated.to_string()),
        ("Running Bots", stats.bots.running.to_string()),
        ("Stopped Bots", stats.bots.stopped.to_string()),
        ("New Bots Today", stats.bots.new_today.to_string()),
        ("Broadcasts", stats.broadcasts.count.to_string()),
        ("Messages Delivered", stats.broadcasts.total_sent.to_string()),
        ("Messages Failed", stats.broadcasts.total_failed.to_string()),
        (
            "Delivery Rate %",
            format!("{:.1}", stats.broadcasts.success_rate),
        ),
        (
            "Generated At",
            stats.generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
    ];

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Metric", "Value"])?;
    for (metric, value) in rows {
        writer.write_record([metric, value.as_str()])?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_bot, sample_user};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn lines(csv: &[u8]) -> Vec<String> {
        let text = std::str::from_utf8(csv.strip_prefix(UTF8_BOM).expect("BOM present"))
            .expect("utf-8");
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn user_counters() {
        let now = now();
        let mut banned = sample_user(2);
        banned.is_banned = true;
        banned.is_active = false;
        let mut admin = sample_user(3);
        admin.role = Role::Admin;
        let mut old = sample_user(4);
        old.joined_at = now - Duration::days(30);
        old.last_activity_at = now - Duration::days(3);

        let stats = Stats::from_records(&[sample_user(1), banned, admin, old], &[], &[], now);

        assert_eq!(stats.users.total, 4);
        assert_eq!(stats.users.active, 3);
        assert_eq!(stats.users.banned, 1);
        assert_eq!(stats.users.admins, 1);
        assert_eq!(stats.users.active_24h, 3);
        assert_eq!(stats.users.active_week, 4);
        assert!((stats.users.active_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn empty_platform_has_zero_rates() {
        let stats = Stats::from_records(&[], &[], &[], now());
        assert!(stats.users.active_rate.abs() < f64::EPSILON);
        assert!(stats.broadcasts.success_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn bot_and_broadcast_counters() {
        let now = now();
        let bots = [
            sample_bot(1, 10, BotStatus::Running),
            sample_bot(2, 10, BotStatus::Running),
            sample_bot(3, 11, BotStatus::Stopped),
        ];
        let record = |sent, failed| BroadcastRecord {
            id: 1,
            initiator_id: 1,
            body: "x".into(),
            recipient_count: sent + failed,
            sent_count: sent,
            failed_count: failed,
            created_at: now,
        };

        let stats = Stats::from_records(&[], &bots, &[record(3, 1), record(5, 1)], now);

        assert_eq!(stats.bots.total, 3);
        assert_eq!(stats.bots.running, 2);
        assert_eq!(stats.bots.stopped, 1);
        assert_eq!(stats.broadcasts.count, 2);
        assert_eq!(stats.broadcasts.total_sent, 8);
        assert!((stats.broadcasts.success_rate - 80.0).abs() < 1e-9);
    }

    #[test]
    fn activity_windows() {
        let now = now();
        let mut last_week = sample_user(2);
        last_week.joined_at = now - Duration::days(3);
        last_week.last_activity_at = now - Duration::days(2);
        let mut dormant = sample_user(3);
        dormant.joined_at = now - Duration::days(60);
        dormant.last_activity_at = now - Duration::days(30);
        let users = [sample_user(1), last_week, dormant];

        let mut old_bot = sample_bot(2, 1, BotStatus::Running);
        old_bot.created_at = now - Duration::days(5);
        let bots = [sample_bot(1, 1, BotStatus::Pending), old_bot];

        let broadcast = |sent, age_days| BroadcastRecord {
            id: 1,
            initiator_id: 1,
            body: "x".into(),
            recipient_count: sent,
            sent_count: sent,
            failed_count: 0,
            created_at: now - Duration::days(age_days),
        };
        let broadcasts = [broadcast(4, 0), broadcast(6, 3), broadcast(100, 20)];

        let day =
            ActivityReport::from_records(ActivityWindow::Day, &users, &bots, &broadcasts, now);
        assert_eq!(day.new_users, 1);
        assert_eq!(day.active_users, 1);
        assert_eq!(day.new_bots, 1);
        assert_eq!(day.broadcasts, 1);
        assert_eq!(day.messages_delivered, 4);

        let week =
            ActivityReport::from_records(ActivityWindow::Week, &users, &bots, &broadcasts, now);
        assert_eq!(week.since, now - Duration::days(7));
        assert_eq!(week.new_users, 2);
        assert_eq!(week.active_users, 2);
        assert_eq!(week.new_bots, 2);
        assert_eq!(week.messages_delivered, 10);
        assert!((week.new_users_per_day - 2.0 / 7.0).abs() < 1e-9);
        assert!((week.activity_rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn users_csv_has_header_and_row_per_user() {
        let mut quoted = sample_user(2);
        quoted.first_name = Some("Smith, John".into());

        let csv = export_users_csv(&[sample_user(1), quoted], now()).expect("csv");
        let lines = lines(&csv);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("User ID,Username,First Name"));
        assert!(lines[1].starts_with("1,@user1,Test,"));
        assert!(lines[2].contains("\"Smith, John\""));
    }

    #[test]
    fn stats_csv_lists_metrics() {
        let stats = Stats::from_records(&[sample_user(1)], &[], &[], now());
        let csv = export_stats_csv(&stats).expect("csv");
        let lines = lines(&csv);

        assert_eq!(lines[0], "Metric,Value");
        assert!(lines.contains(&"Total Users,1".to_string()));
    }
}
