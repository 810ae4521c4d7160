//! Admin panel: statistics, broadcast, user management, hosted bots,
//! required channels, audit log and exports
//!
//! Every entry point re-checks admin rights, so a demotion takes effect on
//! the next button press.

use crate::bot::callbacks::CallbackAction;
use crate::bot::dialogue::{advance, ConversationDialogue, SessionStorage};
use crate::bot::handlers::{render, report_failure};
use crate::bot::resilient::send_message_resilient;
use crate::bot::views::{admin, channels as channel_views, menu};
use crate::bot::DenialCache;
use crate::config::BotSettings;
use anyhow::{anyhow, Result};
use chrono::Utc;
use constructor_core::bots::{parse_extension, BotRegistry};
use constructor_core::broadcast::{BroadcastBody, BroadcastDispatcher};
use constructor_core::channels::ChannelRegistry;
use constructor_core::config::{BOTS_PER_PAGE, MAX_EXTENSION_DAYS};
use constructor_core::conversation::{Event, State};
use constructor_core::error::{CoreError, PermissionError};
use constructor_core::models::{BotSubmission, User as StoredUser};
use constructor_core::reporting::{
    compute_activity, compute_statistics, export_stats_csv, export_users_csv, ActivityWindow,
};
use constructor_core::storage::StorageProvider;
use constructor_core::users::UserRegistry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Audit tag for user list exports.
pub const ACTION_EXPORT_USERS: &str = "export_users";
/// Audit tag for statistics exports.
pub const ACTION_EXPORT_STATS: &str = "export_stats";

/// Entries shown in the audit log view.
const AUDIT_LOG_LIMIT: i64 = 15;

/// Broadcasts in progress, one per admin
#[derive(Default)]
pub struct ActiveBroadcasts {
    running: Mutex<HashMap<i64, CancellationToken>>,
}

impl ActiveBroadcasts {
    /// Register a broadcast for `admin_id`. `None` if one is already running.
    pub async fn begin(&self, admin_id: i64) -> Option<CancellationToken> {
        let mut running = self.running.lock().await;
        if running.contains_key(&admin_id) {
            return None;
        }
        let token = CancellationToken::new();
        running.insert(admin_id, token.clone());
        Some(token)
    }

    /// Ask the admin's broadcast to stop. `false` if none is running.
    pub async fn cancel(&self, admin_id: i64) -> bool {
        self.running
            .lock()
            .await
            .get(&admin_id)
            .map(CancellationToken::cancel)
            .is_some()
    }

    /// Forget a finished broadcast.
    pub async fn finish(&self, admin_id: i64) {
        self.running.lock().await.remove(&admin_id);
    }
}

/// Run an admin's broadcast on its own task and release the admin's slot
/// when it ends, even if it panicked.
pub async fn run_to_completion<F>(work: F, broadcasts: Arc<ActiveBroadcasts>, admin_id: i64)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(work).await {
        error!("Broadcast of admin {admin_id} ended abnormally: {e}");
    }
    broadcasts.finish(admin_id).await;
}

/// Services used by the admin handlers
pub struct AdminContext {
    /// User registry with the admin gate
    pub users: Arc<UserRegistry>,
    /// Hosted bots, for the overview and extensions
    pub bots: Arc<BotRegistry>,
    /// Required channels
    pub channels: Arc<ChannelRegistry>,
    /// Storage for statistics, exports and audit
    pub storage: Arc<dyn StorageProvider>,
    /// Broadcast fan-out
    pub dispatcher: Arc<BroadcastDispatcher>,
    /// Broadcasts in progress
    pub broadcasts: Arc<ActiveBroadcasts>,
    /// Conversation sessions, for the open-conversation count
    pub sessions: Arc<SessionStorage>,
    /// Throttle for "Access denied" notices
    pub denials: Arc<DenialCache>,
    /// Settings
    pub settings: Arc<BotSettings>,
}

impl AdminContext {
    async fn authorize(&self, user: &StoredUser, operation: &str) -> Result<(), PermissionError> {
        self.users.gate().authorize(user, operation).await
    }
}

async fn deny(bot: &Bot, chat_id: ChatId, user: &StoredUser, ctx: &AdminContext) -> Result<()> {
    if ctx.denials.should_send(user.id).await {
        bot.send_message(chat_id, admin::access_denied()).await?;
        ctx.denials.mark_sent(user.id).await;
    }
    Ok(())
}

/// `/admin` and the Admin Panel button.
///
/// # Errors
///
/// Returns an error if Telegram fails.
pub async fn open_panel(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    ctx: &AdminContext,
) -> Result<()> {
    if ctx.authorize(user, "admin_panel").await.is_err() {
        return deny(bot, chat_id, user, ctx).await;
    }
    info!("Admin {} opened the panel", user.id);
    bot.send_message(chat_id, admin::panel(user, ctx.users.gate().is_owner(user.id)))
        .parse_mode(ParseMode::Html)
        .reply_markup(admin::panel_keyboard())
        .await?;
    Ok(())
}

/// Handle an admin panel button.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_admin_callback(
    bot: &Bot,
    q: &CallbackQuery,
    action: CallbackAction,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let chat_id = ChatId::from(q.from.id);
    if ctx.authorize(user, "admin_panel").await.is_err() {
        return deny(bot, chat_id, user, ctx).await;
    }

    match action {
        CallbackAction::AdminPanel => {
            let text = admin::panel(user, ctx.users.gate().is_owner(user.id));
            render(bot, q, text, Some(admin::panel_keyboard())).await?;
        }
        CallbackAction::Stats => show_statistics(bot, q, ctx, dialogue).await?,
        CallbackAction::Broadcast => {
            advance(dialogue, Event::BeginBroadcast).await?;
            let text = admin::broadcast_prompt(ctx.settings.core.max_message_length);
            render(bot, q, text, Some(menu::cancel_keyboard())).await?;
        }
        CallbackAction::ConfirmBroadcast => confirm_broadcast(bot, q, user, ctx, dialogue).await?,
        CallbackAction::StopBroadcast => {
            if ctx.broadcasts.cancel(user.id).await {
                info!("Admin {} stopped their broadcast", user.id);
                render(bot, q, admin::broadcast_stopping(), None).await?;
            }
        }
        CallbackAction::Users(page) => show_users(bot, q, page, ctx, dialogue).await?,
        CallbackAction::SearchUser => {
            advance(dialogue, Event::BeginUserSearch).await?;
            render(bot, q, admin::search_prompt(), Some(menu::cancel_keyboard())).await?;
        }
        CallbackAction::UserDetail(target) => match ctx.users.get(target).await {
            Ok(Some(found)) => show_user(bot, q, &found, ctx).await?,
            Ok(None) => render(bot, q, admin::user_missing(), None).await?,
            Err(e) => report_failure(bot, chat_id, dialogue, &e.into()).await?,
        },
        CallbackAction::Ban(_)
        | CallbackAction::Unban(_)
        | CallbackAction::Promote(_)
        | CallbackAction::Demote(_) => moderate(bot, q, action, user, ctx, dialogue).await?,
        CallbackAction::ExportUsers => export_users(bot, chat_id, user, ctx, dialogue).await?,
        CallbackAction::ExportStats => {
            export_statistics(bot, chat_id, user, ctx, dialogue).await?;
        }
        CallbackAction::DailyStats => {
            show_activity(bot, q, ActivityWindow::Day, ctx, dialogue).await?;
        }
        CallbackAction::WeeklyStats => {
            show_activity(bot, q, ActivityWindow::Week, ctx, dialogue).await?;
        }
        CallbackAction::AuditLog => show_audit_log(bot, q, ctx, dialogue).await?,
        CallbackAction::Bots(_) | CallbackAction::ExtendBot | CallbackAction::ExpireBots => {
            handle_bots_callback(bot, q, action, user, ctx, dialogue).await?;
        }
        CallbackAction::Channels
        | CallbackAction::AddChannel
        | CallbackAction::RemoveChannel(_) => {
            handle_channels_callback(bot, q, action, user, ctx, dialogue).await?;
        }
        _ => warn!("Unexpected admin callback {action:?}"),
    }
    Ok(())
}

async fn show_statistics(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    match compute_statistics(ctx.storage.as_ref()).await {
        Ok(stats) => {
            let sessions = ctx.sessions.tracker().active_sessions();
            let text = admin::statistics(&stats, sessions);
            render(bot, q, text, Some(admin::statistics_keyboard())).await
        }
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e.into()).await,
    }
}

async fn show_users(
    bot: &Bot,
    q: &CallbackQuery,
    page: u32,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    match ctx.users.page(page, ctx.settings.core.users_per_page).await {
        Ok(page) => {
            let text = admin::users_page(&page);
            render(bot, q, text, Some(admin::users_page_keyboard(&page))).await
        }
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e.into()).await,
    }
}

async fn show_activity(
    bot: &Bot,
    q: &CallbackQuery,
    window: ActivityWindow,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    match compute_activity(ctx.storage.as_ref(), window).await {
        Ok(report) => {
            let text = admin::activity(&report);
            render(bot, q, text, Some(admin::activity_keyboard(window))).await
        }
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e.into()).await,
    }
}

async fn show_audit_log(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    match ctx.storage.recent_admin_actions(AUDIT_LOG_LIMIT).await {
        Ok(actions) => {
            let text = admin::audit_log(&actions);
            render(bot, q, text, Some(admin::audit_log_keyboard())).await
        }
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e.into()).await,
    }
}

async fn handle_bots_callback(
    bot: &Bot,
    q: &CallbackQuery,
    action: CallbackAction,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let chat_id = ChatId::from(q.from.id);
    match action {
        CallbackAction::Bots(page) => match ctx.bots.overview(user, page, BOTS_PER_PAGE).await {
            Ok(overview) => {
                let text = admin::bots_overview(&overview);
                render(bot, q, text, Some(admin::bots_overview_keyboard(&overview))).await
            }
            Err(e) => report_failure(bot, chat_id, dialogue, &e).await,
        },
        CallbackAction::ExtendBot => {
            advance(dialogue, Event::BeginBotExtension).await?;
            let text = admin::extend_prompt(MAX_EXTENSION_DAYS);
            render(bot, q, text, Some(menu::cancel_keyboard())).await
        }
        CallbackAction::ExpireBots => match ctx.bots.expire_now(user).await {
            Ok(stopped) => {
                info!("Admin {} stopped {} expired bots", user.id, stopped.len());
                notify_expired(bot, &stopped).await;
                let text = admin::expired_result(&stopped);
                render(bot, q, text, Some(admin::back_to_bots_keyboard())).await
            }
            Err(e) => report_failure(bot, chat_id, dialogue, &e).await,
        },
        _ => Ok(()),
    }
}

/// Tell the owners of expired bots that their bots were stopped.
pub async fn notify_expired(bot: &Bot, stopped: &[BotSubmission]) {
    for expired in stopped {
        let text = menu::bot_expired_notice(expired);
        let owner = ChatId(expired.owner_id);
        if let Err(e) = send_message_resilient(bot, owner, text, Some(ParseMode::Html)).await {
            warn!(
                "Failed to tell owner {} about expired bot {}: {e}",
                expired.owner_id, expired.id
            );
        }
    }
}

async fn handle_channels_callback(
    bot: &Bot,
    q: &CallbackQuery,
    action: CallbackAction,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let chat_id = ChatId::from(q.from.id);
    match action {
        CallbackAction::AddChannel => {
            advance(dialogue, Event::BeginChannelAdd).await?;
            let keyboard = Some(menu::cancel_keyboard());
            return render(bot, q, channel_views::channel_prompt(), keyboard).await;
        }
        CallbackAction::RemoveChannel(channel_id) => {
            if let Err(e) = ctx.channels.remove(user, channel_id).await {
                return report_failure(bot, chat_id, dialogue, &e).await;
            }
        }
        _ => {}
    }

    match ctx.channels.list().await {
        Ok(channels) => {
            let text = channel_views::channel_list(&channels);
            render(bot, q, text, Some(channel_views::channel_list_keyboard(&channels))).await
        }
        Err(e) => report_failure(bot, chat_id, dialogue, &e.into()).await,
    }
}

async fn show_user(
    bot: &Bot,
    q: &CallbackQuery,
    target: &StoredUser,
    ctx: &AdminContext,
) -> Result<()> {
    let is_owner = ctx.users.gate().is_owner(target.id);
    render(
        bot,
        q,
        admin::user_card(target, is_owner),
        Some(admin::user_card_keyboard(target)),
    )
    .await
}

async fn moderate(
    bot: &Bot,
    q: &CallbackQuery,
    action: CallbackAction,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let result = match action {
        CallbackAction::Ban(target) => ctx.users.ban(user, target, None).await,
        CallbackAction::Unban(target) => ctx.users.unban(user, target).await,
        CallbackAction::Promote(target) => ctx.users.promote(user, target).await,
        CallbackAction::Demote(target) => ctx.users.demote(user, target).await,
        _ => return Ok(()),
    };

    match result {
        Ok(target) => show_user(bot, q, &target, ctx).await,
        Err(e) => report_failure(bot, ChatId::from(q.from.id), dialogue, &e).await,
    }
}

/// Broadcast text received while in [`State::AwaitingBroadcastBody`].
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_broadcast_body(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    ctx: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    if ctx.authorize(&user, "broadcast").await.is_err() {
        dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
        return deny(&bot, msg.chat.id, &user, &ctx).await;
    }

    let raw = msg.text().unwrap_or_default();
    let body = match BroadcastBody::parse(raw, ctx.settings.core.max_message_length) {
        Ok(body) => body,
        Err(e) => return report_failure(&bot, msg.chat.id, &dialogue, &e.into()).await,
    };
    let recipients = match ctx.users.recipients().await {
        Ok(recipients) => recipients.len(),
        Err(e) => return report_failure(&bot, msg.chat.id, &dialogue, &e.into()).await,
    };

    let text = admin::broadcast_preview(body.as_str(), recipients);
    advance(
        &dialogue,
        Event::BodyAccepted {
            body: body.as_str().to_string(),
        },
    )
    .await?;
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(admin::broadcast_confirm_keyboard())
        .await?;
    Ok(())
}

async fn confirm_broadcast(
    bot: &Bot,
    q: &CallbackQuery,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let state = dialogue
        .get_or_default()
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    let State::ConfirmingBroadcast { body } = state else {
        return render(bot, q, menu::use_menu(), None).await;
    };
    advance(dialogue, Event::Confirm).await?;

    let chat_id = ChatId::from(q.from.id);
    let body = match BroadcastBody::parse(&body, ctx.settings.core.max_message_length) {
        Ok(body) => body,
        Err(e) => return report_failure(bot, chat_id, dialogue, &e.into()).await,
    };
    let recipients = match ctx.users.recipients().await {
        Ok(recipients) => recipients,
        Err(e) => return report_failure(bot, chat_id, dialogue, &e.into()).await,
    };
    if recipients.is_empty() {
        return render(bot, q, admin::no_recipients(), None).await;
    }
    let Some(cancel) = ctx.broadcasts.begin(user.id).await else {
        return render(bot, q, admin::broadcast_already_running(), None).await;
    };

    info!(
        "Admin {} started a broadcast to {} users",
        user.id,
        recipients.len()
    );
    let text = admin::broadcast_started(recipients.len());
    render(bot, q, text, Some(admin::broadcast_running_keyboard())).await?;

    let bot = bot.clone();
    let dispatcher = ctx.dispatcher.clone();
    let admin_id = user.id;
    let finished = async move {
        let summary = dispatcher
            .dispatch(admin_id, &body, recipients, &cancel)
            .await;
        let report = admin::broadcast_result(&summary);
        if let Err(e) = send_message_resilient(&bot, chat_id, report, Some(ParseMode::Html)).await {
            error!("Failed to deliver broadcast report to {admin_id}: {e}");
        }
    };
    tokio::spawn(run_to_completion(finished, ctx.broadcasts.clone(), admin_id));
    Ok(())
}

/// Search query received while in [`State::AwaitingUserQuery`].
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_user_query(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    ctx: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    if ctx.authorize(&user, "search_user").await.is_err() {
        dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
        return deny(&bot, msg.chat.id, &user, &ctx).await;
    }

    let query = msg.text().unwrap_or_default();
    match ctx.users.search(query).await {
        Ok(found) => {
            advance(&dialogue, Event::QueryResolved).await?;
            let is_owner = ctx.users.gate().is_owner(found.id);
            bot.send_message(msg.chat.id, admin::user_card(&found, is_owner))
                .parse_mode(ParseMode::Html)
                .reply_markup(admin::user_card_keyboard(&found))
                .await?;
            Ok(())
        }
        Err(e) => report_failure(&bot, msg.chat.id, &dialogue, &e).await,
    }
}

/// Channel received while in [`State::AwaitingChannel`].
///
/// A rejected channel keeps the prompt open.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_channel_input(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    ctx: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    let raw = msg.text().unwrap_or_default();
    match ctx.channels.add(&user, raw).await {
        Ok(channel) => {
            advance(&dialogue, Event::ChannelAdded).await?;
            let channels = match ctx.channels.list().await {
                Ok(channels) => channels,
                Err(e) => return report_failure(&bot, msg.chat.id, &dialogue, &e.into()).await,
            };
            bot.send_message(msg.chat.id, channel_views::channel_added(&channel))
                .parse_mode(ParseMode::Html)
                .reply_markup(channel_views::channel_list_keyboard(&channels))
                .await?;
            Ok(())
        }
        Err(CoreError::Permission(_)) => {
            dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
            deny(&bot, msg.chat.id, &user, &ctx).await
        }
        Err(e) => report_failure(&bot, msg.chat.id, &dialogue, &e).await,
    }
}

/// `<bot id> <days>` received while in [`State::AwaitingBotExtension`].
///
/// The owner is told about the new expiry date.
///
/// # Errors
///
/// Returns an error if Telegram or the dialogue storage fails.
pub async fn handle_extension_input(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    ctx: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<()> {
    let (bot_id, days) = match parse_extension(msg.text().unwrap_or_default()) {
        Ok(request) => request,
        Err(e) => return report_failure(&bot, msg.chat.id, &dialogue, &e.into()).await,
    };
    match ctx.bots.extend(&user, bot_id, days).await {
        Ok(extended) => {
            advance(&dialogue, Event::BotExtended).await?;
            bot.send_message(msg.chat.id, admin::bot_extended(&extended, days))
                .parse_mode(ParseMode::Html)
                .reply_markup(admin::back_to_bots_keyboard())
                .await?;
            let notice = menu::bot_extended_notice(&extended, days);
            let owner = ChatId(extended.owner_id);
            if let Err(e) = send_message_resilient(&bot, owner, notice, Some(ParseMode::Html)).await
            {
                warn!("Failed to tell owner {} about the extension: {e}", extended.owner_id);
            }
            Ok(())
        }
        Err(CoreError::Permission(_)) => {
            dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
            deny(&bot, msg.chat.id, &user, &ctx).await
        }
        Err(e) => report_failure(&bot, msg.chat.id, &dialogue, &e).await,
    }
}

async fn audit(ctx: &AdminContext, actor: &StoredUser, action: &str) {
    if let Err(e) = ctx
        .storage
        .record_admin_action(actor.id, action, None, None)
        .await
    {
        warn!("Failed to audit {action} by {}: {e}", actor.id);
    }
}

async fn export_users(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let now = Utc::now();
    let users = match ctx.storage.all_users().await {
        Ok(users) => users,
        Err(e) => return report_failure(bot, chat_id, dialogue, &CoreError::from(e)).await,
    };
    let csv = match export_users_csv(&users, now) {
        Ok(csv) => csv,
        Err(e) => return report_failure(bot, chat_id, dialogue, &CoreError::from(e)).await,
    };

    let file_name = format!("users_{}.csv", now.format("%Y%m%d_%H%M%S"));
    bot.send_document(chat_id, InputFile::memory(csv).file_name(file_name))
        .caption(format!("👥 {} users", users.len()))
        .await?;
    audit(ctx, user, ACTION_EXPORT_USERS).await;
    info!("Admin {} exported {} users", user.id, users.len());
    Ok(())
}

async fn export_statistics(
    bot: &Bot,
    chat_id: ChatId,
    user: &StoredUser,
    ctx: &AdminContext,
    dialogue: &ConversationDialogue,
) -> Result<()> {
    let stats = match compute_statistics(ctx.storage.as_ref()).await {
        Ok(stats) => stats,
        Err(e) => return report_failure(bot, chat_id, dialogue, &CoreError::from(e)).await,
    };
    let csv = match export_stats_csv(&stats) {
        Ok(csv) => csv,
        Err(e) => return report_failure(bot, chat_id, dialogue, &CoreError::from(e)).await,
    };

    let file_name = format!("stats_{}.csv", stats.generated_at.format("%Y%m%d_%H%M%S"));
    bot.send_document(chat_id, InputFile::memory(csv).file_name(file_name))
        .await?;
    audit(ctx, user, ACTION_EXPORT_STATS).await;
    info!("Admin {} exported statistics", user.id);
    Ok(())
}
