use super::State;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// In-memory conversation state per user
///
/// Entries expire after the configured idle time; an expired or missing
/// entry reads as [`State::Idle`]. Users never see each other's state.
#[derive(Clone)]
pub struct ConversationTracker {
    sessions: Cache<i64, State>,
}

impl ConversationTracker {
    /// Creates a tracker whose entries expire after `idle_timeout` without
    /// reads or writes.
    #[must_use]
    pub fn new(idle_timeout: Duration, max_capacity: u64) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(idle_timeout)
            .build();

        Self { sessions }
    }

    /// Current step, `None` when idle.
    pub async fn get_state(&self, user_id: i64) -> Option<State> {
        self.sessions.get(&user_id).await
    }

    /// Replace the step. Setting [`State::Idle`] clears the entry.
    pub async fn set_state(&self, user_id: i64, state: State) {
        if state.is_idle() {
            self.clear_state(user_id).await;
        } else {
            debug!("User {user_id} conversation -> {}", state.name());
            self.sessions.insert(user_id, state).await;
        }
    }

    /// Drop any flow in progress.
    pub async fn clear_state(&self, user_id: i64) {
        self.sessions.invalidate(&user_id).await;
    }

    /// Number of users with a flow in progress (approximate).
    #[must_use]
    pub fn active_sessions(&self) -> u64 {
        self.sessions.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConversationTracker {
        ConversationTracker::new(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn unknown_user_is_idle() {
        assert_eq!(tracker().get_state(1).await, None);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let tracker = tracker();
        tracker.set_state(1, State::AwaitingToken).await;
        tracker.set_state(2, State::AwaitingBroadcastBody).await;

        tracker.clear_state(2).await;

        assert_eq!(tracker.get_state(1).await, Some(State::AwaitingToken));
        assert_eq!(tracker.get_state(2).await, None);
    }

    #[tokio::test]
    async fn setting_idle_clears_entry() {
        let tracker = tracker();
        tracker.set_state(1, State::AwaitingUserQuery).await;
        tracker.set_state(1, State::Idle).await;
        assert_eq!(tracker.get_state(1).await, None);
    }

    #[tokio::test]
    async fn idle_entries_expire() {
        let tracker = ConversationTracker::new(Duration::from_millis(50), 100);
        tracker.set_state(1, State::AwaitingToken).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(tracker.get_state(1).await, None);
    }
}
