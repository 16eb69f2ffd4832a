//! Integration tests for the worker's health surface and scheduler.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server and
//! in-memory stores in place of Postgres, so nothing here needs a database.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{FixedOffset, NaiveDate, Utc};
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;

use loanpush_common::types::{
    LoanRecord, LoanStatus, NewNotification, NotificationStatus, PushPayload,
};
use loanpush_engine::store::{MemoryDeviceRegistry, MemoryLoanSource, MemoryQueueStore};
use loanpush_engine::{BatchProcessor, RateLimiter, ReminderGenerator, ReminderSchedule};
use loanpush_notifier::{DeliveryError, DeliveryTransport, PushSubscription};
use loanpush_worker::routes::create_router;
use loanpush_worker::scheduler::{self, Scheduler};
use loanpush_worker::state::{AppState, HealthState};

// ============================================================
// Helpers
// ============================================================

/// Accepts every delivery and remembers the payloads.
#[derive(Default)]
struct RecordingTransport {
    payloads: Mutex<Vec<PushPayload>>,
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn deliver(
        &self,
        _subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let payload: PushPayload =
            serde_json::from_slice(payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

struct Harness {
    queue: Arc<MemoryQueueStore>,
    devices: Arc<MemoryDeviceRegistry>,
    loans: Arc<MemoryLoanSource>,
    transport: Arc<RecordingTransport>,
    limiter: Arc<RateLimiter>,
    health: HealthState,
    scheduler: Scheduler,
}

fn harness(batch_every: Duration, reminders_every: Duration) -> Harness {
    let queue = Arc::new(MemoryQueueStore::new());
    let devices = Arc::new(MemoryDeviceRegistry::new());
    let loans = Arc::new(MemoryLoanSource::new());
    let transport = Arc::new(RecordingTransport::default());
    let limiter = Arc::new(RateLimiter::new(100));
    let health = HealthState::new();

    let processor = Arc::new(BatchProcessor::new(
        queue.clone(),
        devices.clone(),
        transport.clone(),
        limiter.clone(),
        10,
    ));
    let reminders = Arc::new(ReminderGenerator::new(
        loans.clone(),
        queue.clone(),
        ReminderSchedule {
            office_closing_hour: 8,
            good_morning_hour: 9,
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            due_soon_days: 2,
            max_retries: 3,
        },
    ));

    let scheduler = Scheduler::new(
        processor,
        reminders,
        health.clone(),
        batch_every,
        reminders_every,
    );

    Harness {
        queue,
        devices,
        loans,
        transport,
        limiter,
        health,
        scheduler,
    }
}

fn descriptor(device: &str) -> String {
    format!(
        r#"{{"endpoint":"https://push.example.com/{}","keys":{{"p256dh":"key","auth":"secret"}}}}"#,
        device
    )
}

async fn get_health(h: &Harness) -> serde_json::Value {
    let app = create_router(AppState::new(h.limiter.clone(), h.health.clone(), 10));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================
// Health route
// ============================================================

#[tokio::test]
async fn test_health_before_any_cycle() {
    let h = harness(Duration::from_secs(60), Duration::from_secs(3600));
    let body = get_health(&h).await;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "loanpush-worker");
    assert_eq!(body["batch_size"], 10);
    assert_eq!(body["rate_limit"]["estimate"], 0);
    assert_eq!(body["rate_limit"]["ceiling"], 100);
    assert!(body["last_batch"].is_null());
    assert!(body["last_reminders"].is_null());
}

#[tokio::test]
async fn test_health_reports_last_batch() {
    let h = harness(Duration::from_secs(60), Duration::from_secs(3600));
    let recipient = Uuid::new_v4();
    h.devices.register(recipient, descriptor("phone")).await;
    h.queue
        .push(
            NewNotification {
                recipient_id: recipient,
                title: "Hello".to_string(),
                body: "World".to_string(),
                payload: None,
                max_retries: 3,
            }
            .into_record(Utc::now()),
        )
        .await;

    let report = h.scheduler.run_batch_once().await;
    assert_eq!(report.sent, 1);

    let body = get_health(&h).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["last_batch"]["report"]["processed"], 1);
    assert_eq!(body["last_batch"]["report"]["sent"], 1);
    assert!(body["last_batch"]["finished_at"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = harness(Duration::from_secs(60), Duration::from_secs(3600));
    let app = create_router(AppState::new(h.limiter.clone(), h.health.clone(), 10));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================
// Scheduler
// ============================================================

#[tokio::test]
async fn test_reminder_cycle_recorded_in_health() {
    let h = harness(Duration::from_secs(60), Duration::from_secs(3600));
    let recipient = Uuid::new_v4();
    h.loans
        .add_loan(LoanRecord {
            recipient_id: recipient,
            item_name: "Tripod".to_string(),
            due_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            status: LoanStatus::Overdue,
        })
        .await;

    let report = h.scheduler.run_reminders_once().await;
    assert_eq!(report.overdue, 1);
    assert!(report.failed_tasks.is_empty());

    let body = get_health(&h).await;
    assert_eq!(body["last_reminders"]["report"]["overdue"], 1);
    assert_eq!(h.queue.records().await.len(), 1);
}

#[tokio::test]
async fn test_scheduled_jobs_generate_and_deliver() {
    let h = harness(Duration::from_millis(20), Duration::from_millis(20));
    let recipient = Uuid::new_v4();
    h.devices.register(recipient, descriptor("laptop")).await;
    h.loans
        .add_loan(LoanRecord {
            recipient_id: recipient,
            item_name: "Tripod".to_string(),
            due_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            status: LoanStatus::Borrowed,
        })
        .await;

    let (tx, rx) = watch::channel(false);
    let jobs = h.scheduler.spawn(rx);

    let mut delivered = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !h.transport.payloads.lock().unwrap().is_empty() {
            delivered = true;
            break;
        }
    }

    assert!(scheduler::shutdown(&tx, jobs, Duration::from_secs(1)).await);
    assert!(delivered, "no reminder was delivered before the deadline");

    let payloads = h.transport.payloads.lock().unwrap().clone();
    assert_eq!(payloads[0].title, "Overdue equipment");
    assert_eq!(payloads[0].body, "Please return: Tripod");

    let records = h.queue.records().await;
    assert!(
        records
            .iter()
            .any(|r| r.status == NotificationStatus::Sent && r.recipient_id == recipient)
    );
}

#[tokio::test]
async fn test_no_cycles_after_shutdown() {
    let h = harness(Duration::from_millis(10), Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let jobs = h.scheduler.spawn(rx);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(scheduler::shutdown(&tx, jobs, Duration::from_secs(1)).await);

    let before = h.health.snapshot().await;
    let batch_at = before.last_batch.map(|run| run.finished_at);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = h.health.snapshot().await;
    assert_eq!(after.last_batch.map(|run| run.finished_at), batch_at);
}
