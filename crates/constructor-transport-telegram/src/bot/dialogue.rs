//! teloxide dialogue storage backed by [`ConversationTracker`]
//!
//! Dialogues are keyed by chat id; the platform bot only talks in private
//! chats, where the chat id equals the user id.

use anyhow::{anyhow, Result};
use constructor_core::conversation::{ConversationTracker, Event, State};
use futures_util::future::{BoxFuture, FutureExt};
use std::convert::Infallible;
use std::sync::Arc;
use teloxide::dispatching::dialogue::{Dialogue, Storage};
use teloxide::types::ChatId;
use tracing::debug;

/// Dialogue type used by every handler.
pub type ConversationDialogue = Dialogue<State, SessionStorage>;

/// Idle-expiring dialogue storage
pub struct SessionStorage {
    tracker: ConversationTracker,
}

impl SessionStorage {
    /// Wrap a tracker.
    #[must_use]
    pub fn new(tracker: ConversationTracker) -> Arc<Self> {
        Arc::new(Self { tracker })
    }

    /// Underlying tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ConversationTracker {
        &self.tracker
    }
}

impl Storage<State> for SessionStorage {
    type Error = Infallible;

    fn remove_dialogue(
        self: Arc<Self>,
        chat_id: ChatId,
    ) -> BoxFuture<'static, Result<(), Self::Error>> {
        async move {
            self.tracker.clear_state(chat_id.0).await;
            Ok(())
        }
        .boxed()
    }

    fn update_dialogue(
        self: Arc<Self>,
        chat_id: ChatId,
        dialogue: State,
    ) -> BoxFuture<'static, Result<(), Self::Error>> {
        async move {
            self.tracker.set_state(chat_id.0, dialogue).await;
            Ok(())
        }
        .boxed()
    }

    fn get_dialogue(
        self: Arc<Self>,
        chat_id: ChatId,
    ) -> BoxFuture<'static, Result<Option<State>, Self::Error>> {
        async move { Ok(self.tracker.get_state(chat_id.0).await) }.boxed()
    }
}

/// Apply `event` to the dialogue's current step and store the result.
///
/// # Errors
///
/// Returns an error if the step does not accept the event; the stored step
/// is left untouched in that case.
pub async fn advance(dialogue: &ConversationDialogue, event: Event) -> Result<State> {
    let current = dialogue
        .get_or_default()
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    let event_name = event.name();
    let next = current.apply(event)?;
    debug!("Chat {} dialogue: {event_name} -> {}", dialogue.chat_id(), next.name());

    if next.is_idle() {
        dialogue.exit().await.map_err(|e| anyhow!(e.to_string()))?;
    } else {
        dialogue
            .update(next.clone())
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn storage() -> Arc<SessionStorage> {
        SessionStorage::new(ConversationTracker::new(Duration::from_secs(60), 100))
    }

    #[tokio::test]
    async fn dialogue_round_trips_through_tracker() {
        let storage = storage();
        let dialogue = ConversationDialogue::new(storage.clone(), ChatId(7));

        assert_eq!(dialogue.get().await.ok().flatten(), None);
        advance(&dialogue, Event::BeginBroadcast)
            .await
            .expect("begin");
        assert_eq!(
            storage.tracker().get_state(7).await,
            Some(State::AwaitingBroadcastBody)
        );

        advance(&dialogue, Event::Cancel).await.expect("cancel");
        assert_eq!(storage.tracker().get_state(7).await, None);
    }

    #[tokio::test]
    async fn rejected_event_keeps_state() {
        let storage = storage();
        let dialogue = ConversationDialogue::new(storage.clone(), ChatId(9));
        advance(&dialogue, Event::BeginUserSearch)
            .await
            .expect("begin");

        assert!(advance(&dialogue, Event::Confirm).await.is_err());
        assert_eq!(
            storage.tracker().get_state(9).await,
            Some(State::AwaitingUserQuery)
        );
    }

    #[tokio::test]
    async fn chats_do_not_share_state() {
        let storage = storage();
        let a = ConversationDialogue::new(storage.clone(), ChatId(1));
        let b = ConversationDialogue::new(storage.clone(), ChatId(2));

        advance(&a, Event::BeginBotCreation).await.expect("begin");
        assert_eq!(b.get().await.ok().flatten(), None);
    }
}
