use chrono::{Duration, Utc};
use constructor_core::models::{
    BotStatus, NewBot, NewBroadcast, RequiredChannel, Role, UserProfile,
};
use constructor_core::reporting::compute_statistics;
use constructor_core::storage::{SqliteStorage, StorageError, StorageProvider};
use constructor_core::validator::{BotInfo, BotToken};

async fn storage() -> SqliteStorage {
    SqliteStorage::connect("sqlite::memory:")
        .await
        .expect("Failed to create storage")
}

fn profile(id: i64, username: &str) -> UserProfile {
    UserProfile {
        id,
        username: Some(username.to_string()),
        first_name: Some("Test".to_string()),
        last_name: None,
        language_code: Some("en".to_string()),
    }
}

fn new_bot(owner_id: i64, suffix: char) -> NewBot {
    let token = format!("123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw{suffix}");
    NewBot {
        owner_id,
        token: BotToken::parse(&token).expect("valid token"),
        info: BotInfo {
            id: 123_456_789,
            name: "Echo".to_string(),
            username: format!("echo_{suffix}_bot"),
        },
        expires_at: Utc::now() + Duration::days(30),
    }
}

#[tokio::test]
async fn touch_registers_then_updates() {
    let storage = storage().await;
    let now = Utc::now();

    let (user, is_new) = storage
        .touch_user(&profile(1, "alice"), Role::User, now)
        .await
        .expect("first touch");
    assert!(is_new);
    assert_eq!(user.message_count, 1);
    assert!(user.is_active);

    let later = now + Duration::minutes(5);
    let mut renamed = profile(1, "alice_new");
    renamed.language_code = None;
    let (user, is_new) = storage
        .touch_user(&renamed, Role::Admin, later)
        .await
        .expect("second touch");
    assert!(!is_new);
    assert_eq!(user.message_count, 2);
    assert_eq!(user.username.as_deref(), Some("alice_new"));
    // Role is only set on first contact
    assert_eq!(user.role, Role::User);
    // Missing language keeps the stored one
    assert_eq!(user.language_code.as_deref(), Some("en"));
    assert_eq!(user.last_activity_at.timestamp(), later.timestamp());
}

#[tokio::test]
async fn username_lookup_is_case_insensitive() {
    let storage = storage().await;
    storage
        .touch_user(&profile(7, "Bob"), Role::User, Utc::now())
        .await
        .expect("touch");

    let found = storage
        .find_user_by_username("bob")
        .await
        .expect("query")
        .expect("found");
    assert_eq!(found.id, 7);
}

#[tokio::test]
async fn banned_users_are_not_recipients() {
    let storage = storage().await;
    for id in 1..=3 {
        storage
            .touch_user(&profile(id, &format!("u{id}")), Role::User, Utc::now())
            .await
            .expect("touch");
    }

    assert!(storage
        .set_user_banned(2, true, Some("spam".into()))
        .await
        .expect("ban"));
    assert_eq!(storage.broadcast_recipients().await.expect("recipients"), vec![1, 3]);

    let banned = storage.get_user(2).await.expect("query").expect("found");
    assert!(banned.is_banned);
    assert!(!banned.is_active);
    assert_eq!(banned.ban_reason.as_deref(), Some("spam"));

    storage.set_user_banned(2, false, None).await.expect("unban");
    assert_eq!(
        storage.broadcast_recipients().await.expect("recipients"),
        vec![1, 2, 3]
    );
    assert!(!storage.set_user_banned(99, true, None).await.expect("no-op"));
}

#[tokio::test]
async fn bots_round_trip_and_status_updates() {
    let storage = storage().await;
    let bot = storage
        .insert_bot(&new_bot(10, 'a'), BotStatus::Pending)
        .await
        .expect("insert");

    assert_eq!(storage.count_bots_by_owner(10).await.expect("count"), 1);
    let by_fingerprint = storage
        .find_bot_by_fingerprint(&bot.token.fingerprint())
        .await
        .expect("query")
        .expect("found");
    assert_eq!(by_fingerprint.id, bot.id);
    assert_eq!(by_fingerprint.token, bot.token);

    storage
        .update_bot_status(bot.id, BotStatus::Validated)
        .await
        .expect("update");
    storage
        .update_bot_status(bot.id, BotStatus::Running)
        .await
        .expect("update");
    let running = storage
        .list_bots_by_status(BotStatus::Running)
        .await
        .expect("list");
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].username, "echo_a_bot");

    assert!(storage.delete_bot(bot.id).await.expect("delete"));
    assert!(storage.get_bot(bot.id).await.expect("query").is_none());
}

#[tokio::test]
async fn duplicate_token_is_a_conflict() {
    let storage = storage().await;
    storage
        .insert_bot(&new_bot(10, 'a'), BotStatus::Pending)
        .await
        .expect("first insert");
    assert!(matches!(
        storage
            .insert_bot(&new_bot(11, 'a'), BotStatus::Pending)
            .await,
        Err(StorageError::Conflict(_))
    ));
}

#[tokio::test]
async fn activity_without_message_keeps_counter() {
    let storage = storage().await;
    let now = Utc::now();
    storage
        .touch_user(&profile(1, "alice"), Role::User, now)
        .await
        .expect("touch");

    let later = now + Duration::hours(3);
    let user = storage
        .record_activity(1, later)
        .await
        .expect("update")
        .expect("known user");
    assert_eq!(user.message_count, 1);
    assert_eq!(user.last_activity_at.timestamp(), later.timestamp());

    assert!(storage.record_activity(404, later).await.expect("update").is_none());
}

#[tokio::test]
async fn chosen_language_survives_later_updates() {
    let storage = storage().await;
    storage
        .touch_user(&profile(1, "alice"), Role::User, Utc::now())
        .await
        .expect("touch");
    assert!(storage.set_user_language(1, "uz").await.expect("set"));

    let (user, _) = storage
        .touch_user(&profile(1, "alice"), Role::User, Utc::now())
        .await
        .expect("touch");
    assert_eq!(user.language_code.as_deref(), Some("uz"));
    assert!(!storage.set_user_language(2, "ru").await.expect("no-op"));
}

#[tokio::test]
async fn bot_expiry_can_be_moved() {
    let storage = storage().await;
    let bot = storage
        .insert_bot(&new_bot(10, 'c'), BotStatus::Running)
        .await
        .expect("insert");
    let later = bot.expires_at + Duration::days(10);

    assert!(storage.set_bot_expiry(bot.id, later).await.expect("update"));
    let stored = storage.get_bot(bot.id).await.expect("query").expect("found");
    assert_eq!(stored.expires_at.timestamp(), later.timestamp());
    assert!(!storage.set_bot_expiry(999, later).await.expect("no-op"));
}

#[tokio::test]
async fn required_channels_are_unique() {
    let storage = storage().await;
    let channel = RequiredChannel {
        chat_id: -100_123,
        username: Some("news".into()),
        title: "News".into(),
        added_by: 1,
        added_at: Utc::now(),
    };

    storage
        .insert_required_channel(&channel)
        .await
        .expect("insert");
    assert!(matches!(
        storage.insert_required_channel(&channel).await,
        Err(StorageError::Conflict(_))
    ));
    let stored = storage.list_required_channels().await.expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].chat_id, channel.chat_id);
    assert_eq!(stored[0].username.as_deref(), Some("news"));

    assert!(storage
        .delete_required_channel(channel.chat_id)
        .await
        .expect("delete"));
    assert!(storage.list_required_channels().await.expect("list").is_empty());
}

#[tokio::test]
async fn statistics_over_stored_records() {
    let storage = storage().await;
    let now = Utc::now();
    storage
        .touch_user(&profile(1, "owner"), Role::Admin, now)
        .await
        .expect("touch");
    storage
        .touch_user(&profile(2, "guest"), Role::User, now)
        .await
        .expect("touch");
    storage
        .insert_bot(&new_bot(2, 'b'), BotStatus::Pending)
        .await
        .expect("bot");
    storage
        .insert_broadcast(&NewBroadcast {
            initiator_id: 1,
            body: "hello".into(),
            recipient_count: 2,
            sent_count: 1,
            failed_count: 1,
        })
        .await
        .expect("broadcast");

    let stats = compute_statistics(&storage).await.expect("stats");
    assert_eq!(stats.users.total, 2);
    assert_eq!(stats.users.admins, 1);
    assert_eq!(stats.users.new_today, 2);
    assert_eq!(stats.bots.total, 1);
    assert_eq!(stats.bots.pending, 1);
    assert_eq!(stats.broadcasts.count, 1);
    assert!((stats.broadcasts.success_rate - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn audit_log_is_newest_first() {
    let storage = storage().await;
    storage
        .record_admin_action(1, "ban_user", Some(5), Some("spam".into()))
        .await
        .expect("audit");
    storage
        .record_admin_action(1, "unban_user", Some(5), None)
        .await
        .expect("audit");

    let actions = storage.recent_admin_actions(10).await.expect("actions");
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].action, "unban_user");
    assert_eq!(actions[1].details.as_deref(), Some("spam"));
    assert!(storage.check_connection().await.is_ok());
}
