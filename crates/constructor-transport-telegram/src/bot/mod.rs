/// Admin panel handlers (statistics, broadcast, user management, exports)
pub mod admin_handlers;
/// Handlers for creating and managing hosted bots
pub mod bot_handlers;
/// Inline keyboard callback payloads
pub mod callbacks;
/// Required channel lookups through the Bot API
pub mod channels;
/// Admin access denial flood protection
pub mod denial_cache;
/// teloxide dialogue storage backed by the conversation tracker
pub mod dialogue;
/// General command and message handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Broadcast delivery through the Bot API
pub mod sender;
/// Runtime for the bots users create
pub mod supervisor;
/// Bot token validation through `getMe`
pub mod validator;
/// View layer for UI components (keyboards, messages)
pub mod views;

pub use channels::TelegramChannelDirectory;
pub use denial_cache::DenialCache;
pub use dialogue::SessionStorage;
pub use sender::TelegramSender;
pub use supervisor::TelegramSupervisor;
pub use validator::TelegramTokenValidator;
