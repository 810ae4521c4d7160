//! Conversation sessions as seen through teloxide dialogues

use constructor_core::conversation::{ConversationTracker, Event, State};
use constructor_core::validator::{BotInfo, BotToken};
use constructor_transport_telegram::bot::dialogue::{advance, ConversationDialogue};
use constructor_transport_telegram::bot::SessionStorage;
use std::time::Duration;
use teloxide::types::ChatId;

fn sessions(idle: Duration) -> std::sync::Arc<SessionStorage> {
    SessionStorage::new(ConversationTracker::new(idle, 1_000))
}

fn sample_info() -> BotInfo {
    BotInfo {
        id: 123_456_789,
        name: "Echo".to_string(),
        username: "echo_bot".to_string(),
    }
}

#[tokio::test]
async fn bot_creation_flow_ends_idle() {
    let storage = sessions(Duration::from_secs(60));
    let dialogue = ConversationDialogue::new(storage.clone(), ChatId(100));

    advance(&dialogue, Event::BeginBotCreation)
        .await
        .expect("begin");
    let token = BotToken::parse("123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1").expect("token");
    let state = advance(
        &dialogue,
        Event::TokenValidated {
            token,
            info: sample_info(),
        },
    )
    .await
    .expect("validated");
    assert!(matches!(state, State::ConfirmingBot { .. }));

    let state = advance(&dialogue, Event::Confirm).await.expect("confirm");
    assert!(state.is_idle());
    assert_eq!(storage.tracker().get_state(100).await, None);
}

#[tokio::test]
async fn starting_another_flow_replaces_the_current_one() {
    let storage = sessions(Duration::from_secs(60));
    let dialogue = ConversationDialogue::new(storage.clone(), ChatId(5));

    advance(&dialogue, Event::BeginBroadcast).await.expect("begin");
    advance(
        &dialogue,
        Event::BodyAccepted {
            body: "hello".to_string(),
        },
    )
    .await
    .expect("body");
    advance(&dialogue, Event::BeginBotCreation)
        .await
        .expect("switch");

    assert_eq!(
        storage.tracker().get_state(5).await,
        Some(State::AwaitingToken)
    );
}

#[tokio::test]
async fn idle_sessions_expire() {
    let storage = sessions(Duration::from_millis(50));
    let dialogue = ConversationDialogue::new(storage.clone(), ChatId(8));

    advance(&dialogue, Event::BeginUserSearch)
        .await
        .expect("begin");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(dialogue.get().await.ok().flatten(), None);
    // An expired session accepts a fresh flow
    assert_eq!(
        advance(&dialogue, Event::BeginBroadcast).await.expect("begin"),
        State::AwaitingBroadcastBody
    );
}
