use crate::bot;
use crate::bot::admin_handlers::{notify_expired, ActiveBroadcasts, AdminContext};
use crate::bot::bot_handlers::BotAction;
use crate::bot::callbacks::CallbackAction;
use crate::bot::dialogue::ConversationDialogue;
use crate::bot::handlers::{
    load_user, missing_channels, touch_user, Command, MissingChannels,
};
use crate::bot::views::menu::MenuButton;
use crate::bot::{
    DenialCache, SessionStorage, TelegramChannelDirectory, TelegramSender, TelegramSupervisor,
    TelegramTokenValidator,
};
use crate::config::{get_denial_cache_max_size, get_denial_cooldown, BotSettings};
use chrono::Utc;
use constructor_core::bots::{BotRegistry, RegistryPolicy};
use constructor_core::broadcast::{BroadcastDispatcher, BroadcastOptions};
use constructor_core::channels::ChannelRegistry;
use constructor_core::config::SESSION_CACHE_MAX_SIZE;
use constructor_core::conversation::{ConversationTracker, State};
use constructor_core::models::{Language, User as StoredUser};
use constructor_core::permissions::AdminGate;
use constructor_core::storage::{SqliteStorage, StorageProvider};
use constructor_core::users::UserRegistry;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let storage = init_storage(&settings).await;

    let owners = settings.telegram.admin_user_ids();
    if owners.is_empty() {
        warn!("ADMIN_USER_IDS is empty: nobody can open the admin panel until an admin is promoted.");
    }
    let gate = Arc::new(AdminGate::new(owners, storage.clone()));
    let users = Arc::new(UserRegistry::new(storage.clone(), gate.clone()));

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let supervisor = Arc::new(TelegramSupervisor::new(
        settings.core.token_validation_timeout(),
    ));
    let bots =
        init_bot_registry(&settings, storage.clone(), supervisor.clone(), gate.clone()).await;
    let channels = Arc::new(ChannelRegistry::new(
        storage.clone(),
        Arc::new(TelegramChannelDirectory::new(bot.clone())),
        gate,
        settings.core.membership_cache_ttl(),
    ));

    let dispatcher = Arc::new(BroadcastDispatcher::new(
        Arc::new(TelegramSender::new(bot.clone())),
        storage.clone(),
        BroadcastOptions::from_settings(&settings.core),
    ));
    let sessions = init_sessions(&settings);
    let denials = init_denial_cache();

    let admin = Arc::new(AdminContext {
        users: users.clone(),
        bots: bots.clone(),
        channels: channels.clone(),
        storage,
        dispatcher,
        broadcasts: Arc::new(ActiveBroadcasts::default()),
        sessions: sessions.clone(),
        denials: denials.clone(),
        settings: settings.clone(),
    });
    let handler = setup_handler();

    let shutdown = CancellationToken::new();
    let sweep = spawn_expiry_sweep(
        bot.clone(),
        bots.clone(),
        settings.core.expiry_sweep_interval(),
        shutdown.clone(),
    );

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            users,
            bots,
            channels,
            admin,
            sessions,
            denials,
            settings
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    if let Err(e) = sweep.await {
        warn!("Expiry sweep task ended abnormally: {e}");
    }
    info!("Stopping hosted bots...");
    supervisor.shutdown_all().await;
}

async fn init_storage(settings: &BotSettings) -> Arc<dyn StorageProvider> {
    match SqliteStorage::connect(&settings.core.database_url).await {
        Ok(s) => {
            info!("SQLite storage initialized.");
            if let Err(e) = s.check_connection().await {
                error!("SQLite storage connection check returned error: {e}");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize SQLite storage: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_bot_registry(
    settings: &BotSettings,
    storage: Arc<dyn StorageProvider>,
    supervisor: Arc<TelegramSupervisor>,
    gate: Arc<AdminGate>,
) -> Arc<BotRegistry> {
    let registry = Arc::new(BotRegistry::new(
        storage,
        Arc::new(TelegramTokenValidator::new(
            settings.core.token_validation_timeout(),
        )),
        supervisor,
        gate,
        RegistryPolicy::from_settings(&settings.core, &settings.telegram.telegram_token),
    ));
    if let Err(e) = registry.resume_running().await {
        error!("Failed to resume hosted bots: {e}");
    }
    registry
}

/// Stop expired bots every `every` until `shutdown` fires.
fn spawn_expiry_sweep(
    bot: Bot,
    bots: Arc<BotRegistry>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let every = every.max(Duration::from_secs(1));
    info!("Starting expiry sweep with interval: {every:?}");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match bots.expire_due(Utc::now()).await {
                Ok(stopped) if stopped.is_empty() => debug!("Expiry sweep: nothing to stop"),
                Ok(stopped) => {
                    info!("Expiry sweep stopped {} bots", stopped.len());
                    notify_expired(&bot, &stopped).await;
                }
                Err(e) => error!("Expiry sweep failed: {e}"),
            }
        }
    })
}

fn init_sessions(settings: &BotSettings) -> Arc<SessionStorage> {
    let idle = settings.core.session_idle_timeout();
    info!(
        "Initializing conversation sessions (idle timeout: {}s)",
        idle.as_secs()
    );
    SessionStorage::new(ConversationTracker::new(idle, SESSION_CACHE_MAX_SIZE))
}

fn init_denial_cache() -> Arc<DenialCache> {
    let cooldown = get_denial_cooldown();
    let max_size = get_denial_cache_max_size();

    info!(
        "Initializing DenialCache (cooldown: {}s, max_size: {})",
        cooldown, max_size
    );

    Arc::new(DenialCache::new(cooldown, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter_map_async(
                    |bot: Bot,
                     q: CallbackQuery,
                     users: Arc<UserRegistry>,
                     settings: Arc<BotSettings>| async move {
                        load_user(&bot, &q.from, &users, &settings).await
                    },
                )
                .branch(
                    dptree::filter(|user: StoredUser| user.is_banned)
                        .endpoint(handle_banned_callback),
                )
                .filter_map(|q: CallbackQuery| q.data.as_deref().and_then(CallbackAction::parse))
                .branch(
                    dptree::filter(|action: CallbackAction| {
                        action == CallbackAction::CheckMembership
                    })
                    .endpoint(handle_check_membership),
                )
                .branch(
                    dptree::filter_map(|action: CallbackAction| match action {
                        CallbackAction::SetLanguage(lang) => Some(lang),
                        _ => None,
                    })
                    .enter_dialogue::<CallbackQuery, SessionStorage, State>()
                    .endpoint(handle_set_language),
                )
                .branch(
                    dptree::filter_map_async(
                        |user: StoredUser, channels: Arc<ChannelRegistry>| async move {
                            missing_channels(&user, &channels).await
                        },
                    )
                    .endpoint(handle_join_required_callback),
                )
                .enter_dialogue::<CallbackQuery, SessionStorage, State>()
                .endpoint(handle_callback),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.chat.is_private())
                .filter_map_async(
                    |bot: Bot,
                     msg: Message,
                     users: Arc<UserRegistry>,
                     settings: Arc<BotSettings>| async move {
                        touch_user(&bot, msg.from.as_ref()?, &users, &settings).await
                    },
                )
                .branch(
                    dptree::filter(|user: StoredUser| user.is_banned)
                        .endpoint(handle_banned_message),
                )
                .branch(
                    dptree::filter_map_async(
                        |user: StoredUser, channels: Arc<ChannelRegistry>| async move {
                            missing_channels(&user, &channels).await
                        },
                    )
                    .endpoint(handle_join_required_message),
                )
                .enter_dialogue::<Message, SessionStorage, State>()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter_map(|msg: Message| msg.text().and_then(MenuButton::parse))
                        .endpoint(handle_menu),
                )
                .branch(dptree::case![State::AwaitingToken].endpoint(handle_token))
                .branch(
                    dptree::case![State::AwaitingBroadcastBody].endpoint(handle_broadcast_body),
                )
                .branch(dptree::case![State::AwaitingUserQuery].endpoint(handle_user_query))
                .branch(dptree::case![State::AwaitingChannel].endpoint(handle_channel_input))
                .branch(
                    dptree::case![State::AwaitingBotExtension].endpoint(handle_extension_input),
                )
                .branch(dptree::entry().endpoint(handle_idle_text)),
        )
}

async fn handle_join_required_message(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    missing: MissingChannels,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::show_join_required(&bot, msg.chat.id, &user, &missing).await {
        error!("Join prompt error: {}", e);
    }
    respond(())
}

async fn handle_join_required_callback(
    bot: Bot,
    q: CallbackQuery,
    user: StoredUser,
    missing: MissingChannels,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }
    let chat_id = ChatId::from(q.from.id);
    if let Err(e) = bot::handlers::show_join_required(&bot, chat_id, &user, &missing).await {
        error!("Join prompt error: {}", e);
    }
    respond(())
}

async fn handle_check_membership(
    bot: Bot,
    q: CallbackQuery,
    user: StoredUser,
    channels: Arc<ChannelRegistry>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }
    if let Err(e) = bot::handlers::check_membership(&bot, &q, &user, &channels).await {
        error!("Membership check error: {}", e);
    }
    respond(())
}

async fn handle_set_language(
    bot: Bot,
    q: CallbackQuery,
    lang: Language,
    user: StoredUser,
    users: Arc<UserRegistry>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }
    if let Err(e) = bot::handlers::set_language(&bot, &q, &user, &users, &dialogue, lang).await {
        error!("Language handler error: {}", e);
    }
    respond(())
}

async fn handle_banned_message(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    cache: Arc<DenialCache>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_banned(bot, msg.chat.id, user.id, &cache).await {
        error!("Banned user handler error: {}", e);
    }
    respond(())
}

async fn handle_banned_callback(
    bot: Bot,
    q: CallbackQuery,
    user: StoredUser,
    cache: Arc<DenialCache>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }
    if let Err(e) =
        bot::handlers::handle_banned(bot, ChatId::from(q.from.id), user.id, &cache).await
    {
        error!("Banned user handler error: {}", e);
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    user: StoredUser,
    dialogue: ConversationDialogue,
    admin: Arc<AdminContext>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let res = match cmd {
        Command::Start => {
            bot::handlers::start(bot, msg, user, admin.users.clone(), dialogue).await
        }
        Command::Help => {
            bot::handlers::help(bot, chat_id, &user, &admin.users, &settings).await
        }
        Command::Cancel => {
            bot::handlers::cancel(bot, chat_id, &user, &admin.users, &dialogue).await
        }
        Command::Admin => {
            bot::admin_handlers::open_panel(&bot, chat_id, &user, &admin).await
        }
        Command::Language => bot::handlers::show_language_picker(&bot, chat_id, &user).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_menu(
    bot: Bot,
    msg: Message,
    button: MenuButton,
    user: StoredUser,
    dialogue: ConversationDialogue,
    bots: Arc<BotRegistry>,
    admin: Arc<AdminContext>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    let res = match button {
        MenuButton::MyBots => {
            bot::bot_handlers::show_my_bots(&bot, chat_id, &user, &bots, &dialogue).await
        }
        MenuButton::AddBot => {
            bot::bot_handlers::begin_bot_creation(&bot, chat_id, &user, &bots, &dialogue).await
        }
        MenuButton::Help => {
            bot::handlers::help(bot, chat_id, &user, &admin.users, &admin.settings).await
        }
        MenuButton::AdminPanel => {
            bot::admin_handlers::open_panel(&bot, chat_id, &user, &admin).await
        }
        MenuButton::Language => bot::handlers::show_language_picker(&bot, chat_id, &user).await,
    };
    if let Err(e) = res {
        error!("Menu handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    action: CallbackAction,
    user: StoredUser,
    dialogue: ConversationDialogue,
    bots: Arc<BotRegistry>,
    admin: Arc<AdminContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }

    let res = if let Some(bot_action) = BotAction::from_callback(action) {
        bot::bot_handlers::handle_bot_action(&bot, &q, &user, &bots, &dialogue, bot_action).await
    } else {
        match action {
            CallbackAction::Cancel => {
                bot::handlers::cancel_from_callback(&bot, &q, &dialogue).await
            }
            CallbackAction::Languages => {
                bot::handlers::show_language_picker(&bot, ChatId::from(q.from.id), &user).await
            }
            CallbackAction::ConfirmBot => {
                bot::bot_handlers::confirm_bot(&bot, &q, &user, &bots, &dialogue, &admin.settings)
                    .await
            }
            admin_action => {
                bot::admin_handlers::handle_admin_callback(
                    &bot,
                    &q,
                    admin_action,
                    &user,
                    &admin,
                    &dialogue,
                )
                .await
            }
        }
    };
    if let Err(e) = res {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

async fn handle_token(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    bots: Arc<BotRegistry>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::bot_handlers::handle_token(bot, msg, user, bots, dialogue).await {
        error!("Token handler error: {}", e);
    }
    respond(())
}

async fn handle_broadcast_body(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    admin: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        bot::admin_handlers::handle_broadcast_body(bot, msg, user, admin, dialogue).await
    {
        error!("Broadcast body handler error: {}", e);
    }
    respond(())
}

async fn handle_user_query(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    admin: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::admin_handlers::handle_user_query(bot, msg, user, admin, dialogue).await {
        error!("User search handler error: {}", e);
    }
    respond(())
}

async fn handle_channel_input(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    admin: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        bot::admin_handlers::handle_channel_input(bot, msg, user, admin, dialogue).await
    {
        error!("Channel input handler error: {}", e);
    }
    respond(())
}

async fn handle_extension_input(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    admin: Arc<AdminContext>,
    dialogue: ConversationDialogue,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        bot::admin_handlers::handle_extension_input(bot, msg, user, admin, dialogue).await
    {
        error!("Extension handler error: {}", e);
    }
    respond(())
}

async fn handle_idle_text(
    bot: Bot,
    msg: Message,
    user: StoredUser,
    users: Arc<UserRegistry>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_idle_text(bot, msg, user, users).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}
