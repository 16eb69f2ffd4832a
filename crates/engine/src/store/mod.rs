//! Storage capabilities used by the batch processor and reminder generator.
//!
//! Each collaborator is a trait object so the worker can run against Postgres
//! while tests run against the in-memory backends.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use loanpush_common::error::AppError;
use loanpush_common::types::{LoanRecord, NewNotification, NotificationRecord, StatusUpdate};
use loanpush_notifier::{DescriptorError, PushSubscription};

pub use memory::{MemoryDeviceRegistry, MemoryLoanSource, MemoryQueueStore};
pub use postgres::{PgDeviceRegistry, PgLoanSource, PgQueueStore};

/// Durable queue of notification records.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Up to `limit` pending records, oldest `created_at` first.
    async fn select_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, AppError>;

    async fn update(&self, id: Uuid, update: &StatusUpdate) -> Result<(), AppError>;

    /// Enqueue a new pending record and return its id.
    async fn insert(&self, notification: NewNotification) -> Result<Uuid, AppError>;
}

/// Registry of push subscriptions per recipient.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn select_by_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<DeviceSubscription>, AppError>;

    /// Remove every registration carrying this descriptor. Returns whether any row went away.
    async fn delete_by_descriptor(&self, descriptor: &str) -> Result<bool, AppError>;
}

/// Read side of the lending platform's loan and user tables.
#[async_trait]
pub trait LoanSource: Send + Sync {
    /// Outstanding loans whose due date is strictly before `today`.
    async fn overdue_loans(&self, today: NaiveDate) -> Result<Vec<LoanRecord>, AppError>;

    /// Outstanding loans due within `[from, to]`, both ends inclusive.
    async fn loans_due_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LoanRecord>, AppError>;

    /// Recipients eligible for broadcast reminders.
    async fn active_recipients(&self) -> Result<Vec<Uuid>, AppError>;
}

/// A registered device, with its descriptor parsed once on read.
#[derive(Debug, Clone)]
pub struct DeviceSubscription {
    pub recipient_id: Uuid,
    /// Stored descriptor text; the key for deletion.
    pub descriptor: String,
    pub target: Result<PushSubscription, DescriptorError>,
}

impl DeviceSubscription {
    pub fn new(recipient_id: Uuid, descriptor: String) -> Self {
        let target = PushSubscription::parse(&descriptor);
        Self {
            recipient_id,
            descriptor,
            target,
        }
    }
}
