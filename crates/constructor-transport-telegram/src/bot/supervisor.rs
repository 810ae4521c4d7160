//! Runtime for the bots users create
//!
//! Each hosted bot gets its own teloxide dispatcher on a spawned task. It
//! greets users on `/start` and `/help`; everything else is ignored.

use async_trait::async_trait;
use constructor_core::bots::BotSupervisor;
use constructor_core::error::ExternalApiError;
use constructor_core::models::BotSubmission;
use std::collections::HashMap;
use std::time::Duration;
use teloxide::dispatching::{ShutdownToken, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::views::hosted;

/// Commands understood by hosted bots
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum HostedCommand {
    Start,
    Help,
}

/// What a hosted bot says about itself
#[derive(Clone)]
struct HostedProfile {
    name: String,
    owner_id: i64,
}

struct HostedBot {
    shutdown: ShutdownToken,
    handle: JoinHandle<()>,
}

/// [`BotSupervisor`] that polls every hosted bot in-process
pub struct TelegramSupervisor {
    bots: Mutex<HashMap<i64, HostedBot>>,
    startup_timeout: Duration,
}

impl TelegramSupervisor {
    /// Create a supervisor. `startup_timeout` bounds the `getMe` check run
    /// before a bot is started.
    #[must_use]
    pub fn new(startup_timeout: Duration) -> Self {
        Self {
            bots: Mutex::new(HashMap::new()),
            startup_timeout,
        }
    }

    async fn is_serving(&self, bot_id: i64) -> bool {
        self.bots
            .lock()
            .await
            .get(&bot_id)
            .is_some_and(|hosted| !hosted.handle.is_finished())
    }

    /// Stop every hosted bot. Used on shutdown.
    pub async fn shutdown_all(&self) {
        let bots: Vec<(i64, HostedBot)> = self.bots.lock().await.drain().collect();
        for (bot_id, hosted) in bots {
            stop_hosted(bot_id, hosted).await;
        }
    }
}

#[async_trait]
impl BotSupervisor for TelegramSupervisor {
    async fn start(&self, submission: &BotSubmission) -> Result<(), ExternalApiError> {
        if self.is_serving(submission.id).await {
            return Ok(());
        }

        let bot = Bot::new(submission.token.expose());
        match tokio::time::timeout(self.startup_timeout, bot.get_me()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Hosted bot {} failed getMe: {e}", submission.id);
                return Err(ExternalApiError::Telegram(
                    "Telegram refused the bot token".to_string(),
                ));
            }
            Err(_) => return Err(ExternalApiError::Timeout(self.startup_timeout)),
        }

        let mut bots = self.bots.lock().await;
        if bots
            .get(&submission.id)
            .is_some_and(|existing| !existing.handle.is_finished())
        {
            // Started by a concurrent call while getMe was running
            return Ok(());
        }

        let profile = HostedProfile {
            name: submission.name.clone(),
            owner_id: submission.owner_id,
        };
        let mut dispatcher = Dispatcher::builder(bot, hosted_handler())
            .dependencies(dptree::deps![profile])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();

        let bot_id = submission.id;
        let handle = tokio::spawn(async move {
            dispatcher.dispatch().await;
            info!("Hosted bot {bot_id} dispatcher finished");
        });

        bots.insert(submission.id, HostedBot { shutdown, handle });
        info!("Hosted bot {} (@{}) started", submission.id, submission.username);
        Ok(())
    }

    async fn stop(&self, bot_id: i64) -> Result<(), ExternalApiError> {
        let hosted = self.bots.lock().await.remove(&bot_id);
        if let Some(hosted) = hosted {
            stop_hosted(bot_id, hosted).await;
        }
        Ok(())
    }
}

async fn stop_hosted(bot_id: i64, hosted: HostedBot) {
    match hosted.shutdown.shutdown() {
        Ok(done) => {
            if tokio::time::timeout(Duration::from_secs(10), done)
                .await
                .is_err()
            {
                warn!("Hosted bot {bot_id} did not stop in time, aborting");
                hosted.handle.abort();
            }
        }
        // Dispatcher has not started polling yet
        Err(_) => hosted.handle.abort(),
    }
    info!("Hosted bot {bot_id} stopped");
}

fn hosted_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .filter_command::<HostedCommand>()
        .endpoint(handle_hosted_command)
}

async fn handle_hosted_command(
    bot: Bot,
    msg: Message,
    cmd: HostedCommand,
    profile: HostedProfile,
) -> Result<(), teloxide::RequestError> {
    let text = match cmd {
        HostedCommand::Start => hosted::greeting(&profile.name, profile.owner_id),
        HostedCommand::Help => hosted::help(&profile.name),
    };
    if let Err(e) = bot
        .send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        error!("Hosted bot reply error: {}", e);
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopping_an_unknown_bot_is_a_no_op() {
        let supervisor = TelegramSupervisor::new(Duration::from_secs(1));
        assert!(!supervisor.is_serving(42).await);
        assert!(supervisor.stop(42).await.is_ok());
        supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn lock_is_free_while_get_me_runs() {
        let supervisor = std::sync::Arc::new(TelegramSupervisor::new(Duration::from_millis(300)));
        let now = chrono::Utc::now();
        let submission = constructor_core::models::BotSubmission {
            id: 9,
            owner_id: 1,
            token: constructor_core::validator::BotToken::parse(
                "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1",
            )
            .expect("token"),
            bot_user_id: 123_456_789,
            name: "Echo".into(),
            username: "echo_bot".into(),
            status: constructor_core::models::BotStatus::Running,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::days(1),
        };

        let starting = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.start(&submission).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // stop must not wait for the slow getMe of another bot
        let stopped = tokio::time::timeout(Duration::from_millis(100), supervisor.stop(42)).await;
        assert!(matches!(stopped, Ok(Ok(()))));
        starting.abort();
    }

    #[test]
    fn hosted_commands_parse() {
        assert!(matches!(
            HostedCommand::parse("/start", "echo_bot"),
            Ok(HostedCommand::Start)
        ));
        assert!(HostedCommand::parse("/admin", "echo_bot").is_err());
    }
}
