//! Testing helpers and mock utilities.
//!
//! Provides sample records and convenient constructors for mocked providers.

use crate::models::{BotStatus, BotSubmission, RequiredChannel, Role, User};
use crate::storage::MockStorageProvider;
use crate::validator::{BotInfo, BotToken};
use chrono::{Duration, Utc};

/// Token accepted by [`BotToken::parse`].
pub const SAMPLE_TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1";

/// Active, non-banned regular user.
#[must_use]
pub fn sample_user(id: i64) -> User {
    let now = Utc::now();
    User {
        id,
        username: Some(format!("user{id}")),
        first_name: Some("Test".to_string()),
        last_name: None,
        language_code: Some("en".to_string()),
        role: Role::User,
        is_active: true,
        is_banned: false,
        ban_reason: None,
        joined_at: now,
        last_activity_at: now,
        message_count: 1,
    }
}

/// Parsed [`SAMPLE_TOKEN`].
#[must_use]
pub fn sample_token() -> BotToken {
    BotToken::parse(SAMPLE_TOKEN).expect("sample token is well formed")
}

/// `getMe` answer for [`SAMPLE_TOKEN`].
#[must_use]
pub fn sample_bot_info() -> BotInfo {
    BotInfo {
        id: 123_456_789,
        name: "Sample Bot".to_string(),
        username: "sample_bot".to_string(),
    }
}

/// Stored bot in the given status.
#[must_use]
pub fn sample_bot(id: i64, owner_id: i64, status: BotStatus) -> BotSubmission {
    let now = Utc::now();
    let info = sample_bot_info();
    BotSubmission {
        id,
        owner_id,
        token: sample_token(),
        bot_user_id: info.id,
        name: info.name,
        username: info.username,
        status,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::days(30),
    }
}

/// Public required channel.
#[must_use]
pub fn sample_channel(chat_id: i64) -> RequiredChannel {
    RequiredChannel {
        chat_id,
        username: Some(format!("channel{}", chat_id.unsigned_abs() % 1000)),
        title: "News".to_string(),
        added_by: 1,
        added_at: Utc::now(),
    }
}

/// Create a mock storage provider that accepts audit writes.
///
/// Every `record_admin_action` call returns `Ok(())`; nothing else is
/// expected.
#[must_use]
pub fn mock_storage_audit_only() -> MockStorageProvider {
    let mut mock = MockStorageProvider::new();
    mock.expect_record_admin_action()
        .returning(|_, _, _, _| Ok(()));
    mock
}
