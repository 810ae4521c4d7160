use super::{BroadcastBody, FailureReason, MessageSender, SendOutcome};
use crate::config::CoreSettings;
use crate::models::NewBroadcast;
use crate::storage::StorageProvider;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Audit tag for completed broadcasts
pub const ACTION_BROADCAST: &str = "broadcast";

/// Tuning for a broadcast run
#[derive(Debug, Clone, Copy)]
pub struct BroadcastOptions {
    /// Maximum sends in flight
    pub concurrency: usize,
    /// Pause held by a send slot after each send
    pub delay: Duration,
    /// Per-recipient send timeout
    pub send_timeout: Duration,
}

impl BroadcastOptions {
    /// Options taken from the platform settings.
    #[must_use]
    pub const fn from_settings(settings: &CoreSettings) -> Self {
        Self {
            concurrency: settings.broadcast_concurrency,
            delay: settings.broadcast_delay(),
            send_timeout: settings.send_timeout(),
        }
    }
}

/// Outcome for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipient id
    pub recipient: i64,
    /// What happened
    pub outcome: SendOutcome,
}

/// Aggregate result of a broadcast
#[derive(Debug, Clone)]
pub struct BroadcastSummary {
    /// Delivered
    pub sent: u64,
    /// Attempted but not delivered
    pub failed: u64,
    /// Never attempted because the broadcast was cancelled
    pub skipped: u64,
    /// Attempted recipients, `sent + failed`
    pub total: u64,
    /// `sent / total`, 0 when nothing was attempted
    pub success_rate: f64,
    /// When the last send finished
    pub completed_at: DateTime<Utc>,
    /// Id of the stored broadcast record, if one was written
    pub record_id: Option<i64>,
    /// Per-recipient outcomes in completion order
    pub deliveries: Vec<DeliveryReport>,
}

impl BroadcastSummary {
    fn empty(skipped: u64) -> Self {
        Self {
            sent: 0,
            failed: 0,
            skipped,
            total: 0,
            success_rate: 0.0,
            completed_at: Utc::now(),
            record_id: None,
            deliveries: Vec::new(),
        }
    }

    /// Whether cancellation stopped the run early.
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        self.skipped > 0
    }

    /// Failures matching `predicate`.
    #[must_use]
    pub fn count_failures(&self, predicate: impl Fn(&FailureReason) -> bool) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(&d.outcome, SendOutcome::Failed(reason) if predicate(reason)))
            .count()
    }
}

/// Rate-limit pause shared by all send slots of one run
#[derive(Default)]
struct Pacer {
    resume_at: Mutex<Option<Instant>>,
}

impl Pacer {
    fn pause_for(&self, retry_after: Duration) {
        let until = Instant::now() + retry_after;
        if let Ok(mut resume_at) = self.resume_at.lock() {
            if resume_at.is_none_or(|current| current < until) {
                *resume_at = Some(until);
            }
        }
    }

    async fn wait(&self) {
        let resume_at = self.resume_at.lock().ok().and_then(|guard| *guard);
        if let Some(until) = resume_at {
            tokio::time::sleep_until(until).await;
        }
    }
}

/// Sends one body to many users with at most `concurrency` sends in flight
pub struct BroadcastDispatcher {
    sender: Arc<dyn MessageSender>,
    storage: Arc<dyn StorageProvider>,
    options: BroadcastOptions,
}

impl BroadcastDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        sender: Arc<dyn MessageSender>,
        storage: Arc<dyn StorageProvider>,
        options: BroadcastOptions,
    ) -> Self {
        Self {
            sender,
            storage,
            options,
        }
    }

    /// Deliver `body` to every recipient.
    ///
    /// Duplicate ids are sent once. A failed send is recorded and never
    /// retried; rate limits pause later sends instead. When `cancel` fires,
    /// no new sends start, in-flight sends finish, and the rest are skipped.
    /// A send still held back by a rate-limit pause counts as skipped.
    /// A record is stored only if at least one send was attempted; failing
    /// to store it is logged and leaves `record_id` empty.
    pub async fn dispatch(
        &self,
        initiator_id: i64,
        body: &BroadcastBody,
        recipients: Vec<i64>,
        cancel: &CancellationToken,
    ) -> BroadcastSummary {
        let recipients = dedup(recipients);
        if recipients.is_empty() {
            info!("Broadcast by {initiator_id} skipped: no eligible recipients");
            return BroadcastSummary::empty(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let pacer = Arc::new(Pacer::default());
        let text: Arc<str> = Arc::from(body.as_str());
        let mut tasks = JoinSet::new();
        let mut attempted: u64 = 0;

        info!(
            "Broadcast by {initiator_id} to {} recipients (concurrency {})",
            recipients.len(),
            self.options.concurrency
        );

        for recipient in recipients.iter().copied() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            attempted += 1;

            let sender = self.sender.clone();
            let pacer = pacer.clone();
            let text = text.clone();
            let cancel = cancel.clone();
            let BroadcastOptions {
                delay,
                send_timeout,
                ..
            } = self.options;

            tasks.spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return None,
                    () = pacer.wait() => {}
                }
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome =
                    match tokio::time::timeout(send_timeout, sender.send(recipient, &text)).await {
                        Ok(outcome) => outcome,
                        Err(_) => SendOutcome::Failed(FailureReason::Timeout),
                    };
                if let SendOutcome::Failed(FailureReason::RateLimited { retry_after }) = &outcome {
                    warn!("Rate limited on recipient {recipient}, pausing {retry_after:?}");
                    pacer.pause_for(*retry_after);
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                drop(permit);
                Some(DeliveryReport { recipient, outcome })
            });
        }

        let mut sent: u64 = 0;
        let mut failed: u64 = 0;
        let mut held_back: u64 = 0;
        let mut deliveries = Vec::with_capacity(recipients.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(None) => held_back += 1,
                Ok(Some(report)) => {
                    if report.outcome.is_sent() {
                        sent += 1;
                    } else {
                        failed += 1;
                    }
                    deliveries.push(report);
                }
                Err(e) => {
                    error!("Broadcast send task failed: {e}");
                    failed += 1;
                }
            }
        }

        let skipped = recipients.len() as u64 - attempted + held_back;
        if sent + failed == 0 {
            info!("Broadcast by {initiator_id} cancelled before any send");
            return BroadcastSummary::empty(skipped);
        }

        let total = sent + failed;
        #[allow(clippy::cast_precision_loss)]
        let success_rate = sent as f64 / total as f64;
        let record_id = self
            .persist(initiator_id, body, total, sent, failed, skipped)
            .await;

        info!(
            "Broadcast by {initiator_id} finished: {sent}/{total} delivered, {failed} failed, {skipped} skipped"
        );

        BroadcastSummary {
            sent,
            failed,
            skipped,
            total,
            success_rate,
            completed_at: Utc::now(),
            record_id,
            deliveries,
        }
    }

    async fn persist(
        &self,
        initiator_id: i64,
        body: &BroadcastBody,
        total: u64,
        sent: u64,
        failed: u64,
        skipped: u64,
    ) -> Option<i64> {
        let as_count = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        let record = NewBroadcast {
            initiator_id,
            body: body.as_str().to_string(),
            recipient_count: as_count(total),
            sent_count: as_count(sent),
            failed_count: as_count(failed),
        };

        let stored = match self.storage.insert_broadcast(&record).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store broadcast record for {initiator_id}: {e}");
                return None;
            }
        };

        let details = format!("record={} sent={sent} failed={failed} skipped={skipped}", stored.id);
        if let Err(e) = self
            .storage
            .record_admin_action(initiator_id, ACTION_BROADCAST, None, Some(details))
            .await
        {
            warn!("Failed to audit broadcast {}: {e}", stored.id);
        }
        Some(stored.id)
    }
}

fn dedup(recipients: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(recipients.len());
    recipients.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MockMessageSender;
    use crate::models::BroadcastRecord;
    use crate::storage::MockStorageProvider;
    use mockall::predicate::always;

    fn options() -> BroadcastOptions {
        BroadcastOptions {
            concurrency: 2,
            delay: Duration::ZERO,
            send_timeout: Duration::from_secs(5),
        }
    }

    fn storage_expecting_record() -> MockStorageProvider {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_insert_broadcast()
            .times(1)
            .returning(|record| {
                Ok(BroadcastRecord {
                    id: 1,
                    initiator_id: record.initiator_id,
                    body: record.body.clone(),
                    recipient_count: record.recipient_count,
                    sent_count: record.sent_count,
                    failed_count: record.failed_count,
                    created_at: Utc::now(),
                })
            });
        storage
            .expect_record_admin_action()
            .with(always(), always(), always(), always())
            .returning(|_, _, _, _| Ok(()));
        storage
    }

    fn body() -> BroadcastBody {
        BroadcastBody::parse("news", 100).expect("valid body")
    }

    #[tokio::test]
    async fn one_failure_out_of_three() {
        let mut sender = MockMessageSender::new();
        sender.expect_send().returning(|recipient, _| {
            if recipient == 2 {
                SendOutcome::Failed(FailureReason::Unreachable)
            } else {
                SendOutcome::Sent
            }
        });

        let dispatcher =
            BroadcastDispatcher::new(Arc::new(sender), Arc::new(storage_expecting_record()), options());
        let summary = dispatcher
            .dispatch(1, &body(), vec![1, 2, 3], &CancellationToken::new())
            .await;

        assert_eq!((summary.sent, summary.failed, summary.total), (2, 1, 3));
        assert!((summary.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.record_id, Some(1));
        assert_eq!(summary.count_failures(|r| *r == FailureReason::Unreachable), 1);
    }

    #[tokio::test]
    async fn zero_recipients_is_a_noop() {
        let mut sender = MockMessageSender::new();
        sender.expect_send().never();
        let mut storage = MockStorageProvider::new();
        storage.expect_insert_broadcast().never();

        let dispatcher = BroadcastDispatcher::new(Arc::new(sender), Arc::new(storage), options());
        let summary = dispatcher
            .dispatch(1, &body(), Vec::new(), &CancellationToken::new())
            .await;

        assert_eq!(summary.total, 0);
        assert!(summary.success_rate.abs() < f64::EPSILON);
        assert_eq!(summary.record_id, None);
    }

    #[tokio::test]
    async fn duplicate_recipients_are_sent_once() {
        let mut sender = MockMessageSender::new();
        sender.expect_send().times(2).returning(|_, _| SendOutcome::Sent);

        let dispatcher =
            BroadcastDispatcher::new(Arc::new(sender), Arc::new(storage_expecting_record()), options());
        let summary = dispatcher
            .dispatch(1, &body(), vec![5, 6, 5, 5], &CancellationToken::new())
            .await;

        assert_eq!(summary.total, 2);
    }

    #[tokio::test]
    async fn record_failure_keeps_summary() {
        let mut sender = MockMessageSender::new();
        sender.expect_send().returning(|_, _| SendOutcome::Sent);
        let mut storage = MockStorageProvider::new();
        storage.expect_insert_broadcast().returning(|_| {
            Err(crate::storage::StorageError::Corrupt("disk full".into()))
        });

        let dispatcher = BroadcastDispatcher::new(Arc::new(sender), Arc::new(storage), options());
        let summary = dispatcher
            .dispatch(1, &body(), vec![1, 2], &CancellationToken::new())
            .await;

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.record_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_send_times_out() {
        struct Stalled;

        #[async_trait::async_trait]
        impl MessageSender for Stalled {
            async fn send(&self, _recipient: i64, _body: &str) -> SendOutcome {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                SendOutcome::Sent
            }
        }

        let dispatcher = BroadcastDispatcher::new(
            Arc::new(Stalled),
            Arc::new(storage_expecting_record()),
            options(),
        );
        let summary = dispatcher
            .dispatch(1, &body(), vec![1], &CancellationToken::new())
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.count_failures(|r| *r == FailureReason::Timeout), 1);
    }
}
