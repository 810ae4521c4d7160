use async_trait::async_trait;
use constructor_core::broadcast::{
    BroadcastBody, BroadcastDispatcher, BroadcastOptions, FailureReason, MessageSender,
    SendOutcome,
};
use constructor_core::storage::{SqliteStorage, StorageProvider};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sender that records how many sends overlap and which ids it saw.
#[derive(Default)]
struct InstrumentedSender {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    seen: Mutex<Vec<i64>>,
    failing: HashSet<i64>,
    latency: Duration,
}

#[async_trait]
impl MessageSender for InstrumentedSender {
    async fn send(&self, recipient: i64, _body: &str) -> SendOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Ok(mut seen) = self.seen.lock() {
            seen.push(recipient);
        }
        if self.failing.contains(&recipient) {
            SendOutcome::Failed(FailureReason::Unreachable)
        } else {
            SendOutcome::Sent
        }
    }
}

async fn memory_storage() -> Arc<SqliteStorage> {
    Arc::new(
        SqliteStorage::connect("sqlite::memory:")
            .await
            .expect("in-memory storage"),
    )
}

fn options(concurrency: usize) -> BroadcastOptions {
    BroadcastOptions {
        concurrency,
        delay: Duration::ZERO,
        send_timeout: Duration::from_secs(30),
    }
}

fn body() -> BroadcastBody {
    BroadcastBody::parse("Platform maintenance tonight", 4000).expect("valid body")
}

#[tokio::test]
async fn in_flight_sends_never_exceed_limit() {
    let sender = Arc::new(InstrumentedSender {
        latency: Duration::from_millis(20),
        ..InstrumentedSender::default()
    });
    let storage = memory_storage().await;
    let dispatcher = BroadcastDispatcher::new(sender.clone(), storage.clone(), options(4));

    let summary = dispatcher
        .dispatch(1, &body(), (1..=40).collect(), &CancellationToken::new())
        .await;

    assert_eq!(summary.sent, 40);
    assert!(sender.high_water.load(Ordering::SeqCst) <= 4);
    assert!(
        sender.high_water.load(Ordering::SeqCst) > 1,
        "sends should overlap"
    );

    let records = storage.list_broadcasts().await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recipient_count, 40);
    assert_eq!(records[0].sent_count + records[0].failed_count, 40);
}

#[tokio::test]
async fn failures_do_not_stop_other_sends() {
    let sender = Arc::new(InstrumentedSender {
        failing: HashSet::from([3, 7, 9]),
        ..InstrumentedSender::default()
    });
    let storage = memory_storage().await;
    let dispatcher = BroadcastDispatcher::new(sender.clone(), storage.clone(), options(3));

    let summary = dispatcher
        .dispatch(1, &body(), (1..=10).collect(), &CancellationToken::new())
        .await;

    assert_eq!((summary.sent, summary.failed, summary.total), (7, 3, 10));
    assert!((summary.success_rate - 0.7).abs() < 1e-9);
    let seen = sender.seen.lock().expect("lock").len();
    assert_eq!(seen, 10);

    let actions = storage.recent_admin_actions(5).await.expect("audit");
    assert_eq!(actions[0].action, "broadcast");
}

#[tokio::test]
async fn cancelled_before_dispatch_sends_nothing() {
    let sender = Arc::new(InstrumentedSender::default());
    let storage = memory_storage().await;
    let dispatcher = BroadcastDispatcher::new(sender.clone(), storage.clone(), options(2));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = dispatcher.dispatch(1, &body(), vec![1, 2, 3], &cancel).await;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.skipped, 3);
    assert!(summary.was_cancelled());
    assert!(sender.seen.lock().expect("lock").is_empty());
    assert!(storage.list_broadcasts().await.expect("records").is_empty());
}

#[tokio::test]
async fn cancel_mid_flight_skips_remaining() {
    let sender = Arc::new(InstrumentedSender {
        latency: Duration::from_millis(50),
        ..InstrumentedSender::default()
    });
    let storage = memory_storage().await;
    let dispatcher = Arc::new(BroadcastDispatcher::new(
        sender.clone(),
        storage.clone(),
        options(1),
    ));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        trigger.cancel();
    });

    let summary = dispatcher
        .dispatch(1, &body(), (1..=20).collect(), &cancel)
        .await;

    assert!(summary.skipped > 0);
    assert!(summary.total > 0);
    assert_eq!(summary.total + summary.skipped, 20);
    assert_eq!(summary.sent + summary.failed, summary.total);

    let records = storage.list_broadcasts().await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(
        u64::try_from(records[0].recipient_count).expect("non-negative"),
        summary.total
    );
}

#[tokio::test]
async fn rate_limit_pauses_later_sends() {
    struct LimitedOnce {
        limited: AtomicUsize,
        sent_at: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl MessageSender for LimitedOnce {
        async fn send(&self, _recipient: i64, _body: &str) -> SendOutcome {
            if self.limited.fetch_add(1, Ordering::SeqCst) == 0 {
                return SendOutcome::Failed(FailureReason::RateLimited {
                    retry_after: Duration::from_millis(200),
                });
            }
            if let Ok(mut sent_at) = self.sent_at.lock() {
                sent_at.push(tokio::time::Instant::now());
            }
            SendOutcome::Sent
        }
    }

    let started = tokio::time::Instant::now();
    let sender = Arc::new(LimitedOnce {
        limited: AtomicUsize::new(0),
        sent_at: Mutex::new(Vec::new()),
    });
    let dispatcher = BroadcastDispatcher::new(sender.clone(), memory_storage().await, options(1));

    let summary = dispatcher
        .dispatch(1, &body(), vec![1, 2, 3], &CancellationToken::new())
        .await;

    // The limited recipient is not retried
    assert_eq!((summary.sent, summary.failed), (2, 1));
    let sent_at = sender.sent_at.lock().expect("lock");
    assert!(sent_at
        .iter()
        .all(|at| at.duration_since(started) >= Duration::from_millis(200)));
}

#[tokio::test]
async fn cancel_during_rate_limit_pause_sends_nothing_more() {
    struct LimitedFirst {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MessageSender for LimitedFirst {
        async fn send(&self, recipient: i64, _body: &str) -> SendOutcome {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(recipient);
            }
            if recipient == 1 {
                SendOutcome::Failed(FailureReason::RateLimited {
                    retry_after: Duration::from_millis(500),
                })
            } else {
                SendOutcome::Sent
            }
        }
    }

    let sender = Arc::new(LimitedFirst {
        seen: Mutex::new(Vec::new()),
    });
    let storage = memory_storage().await;
    let dispatcher = BroadcastDispatcher::new(sender.clone(), storage.clone(), options(1));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let summary = dispatcher.dispatch(1, &body(), vec![1, 2, 3], &cancel).await;

    assert_eq!(*sender.seen.lock().expect("lock"), vec![1]);
    assert_eq!((summary.sent, summary.failed, summary.total), (0, 1, 1));
    assert_eq!(summary.skipped, 2);
    assert!(started.elapsed() < Duration::from_millis(500));

    let records = storage.list_broadcasts().await.expect("records");
    assert_eq!(records[0].recipient_count, 1);
}
