//! In-memory stores with the same semantics as the Postgres backends.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use loanpush_common::error::AppError;
use loanpush_common::types::{
    LoanRecord, NewNotification, NotificationRecord, NotificationStatus, StatusUpdate,
};

use super::{DeviceRegistry, DeviceSubscription, LoanSource, QueueStore};

/// In-memory notification queue.
#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    records: Arc<Mutex<Vec<NotificationRecord>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully formed record, keeping its id and `created_at`.
    pub async fn push(&self, record: NotificationRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn get(&self, id: Uuid) -> Option<NotificationRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot of every record in insertion order.
    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn select_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, AppError> {
        let records = self.records.lock().await;
        let mut pending: Vec<NotificationRecord> = records
            .iter()
            .filter(|r| r.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update(&self, id: Uuid, update: &StatusUpdate) -> Result<(), AppError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
        update.apply(record);
        Ok(())
    }

    async fn insert(&self, notification: NewNotification) -> Result<Uuid, AppError> {
        let record = notification.into_record(Utc::now());
        let id = record.id;
        self.records.lock().await.push(record);
        Ok(id)
    }
}

/// In-memory device registry.
#[derive(Clone, Default)]
pub struct MemoryDeviceRegistry {
    entries: Arc<Mutex<Vec<(Uuid, String)>>>,
}

impl MemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, recipient_id: Uuid, descriptor: impl Into<String>) {
        self.entries.lock().await.push((recipient_id, descriptor.into()));
    }

    /// Raw descriptors currently registered for a recipient.
    pub async fn descriptors_for(&self, recipient_id: Uuid) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(owner, _)| *owner == recipient_id)
            .map(|(_, descriptor)| descriptor.clone())
            .collect()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryDeviceRegistry {
    async fn select_by_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<DeviceSubscription>, AppError> {
        Ok(self
            .descriptors_for(recipient_id)
            .await
            .into_iter()
            .map(|descriptor| DeviceSubscription::new(recipient_id, descriptor))
            .collect())
    }

    async fn delete_by_descriptor(&self, descriptor: &str) -> Result<bool, AppError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(_, d)| d != descriptor);
        Ok(entries.len() < before)
    }
}

/// In-memory loan and user tables.
#[derive(Clone, Default)]
pub struct MemoryLoanSource {
    loans: Arc<Mutex<Vec<LoanRecord>>>,
    active: Arc<Mutex<Vec<Uuid>>>,
}

impl MemoryLoanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_loan(&self, loan: LoanRecord) {
        self.loans.lock().await.push(loan);
    }

    pub async fn add_active_recipient(&self, recipient_id: Uuid) {
        self.active.lock().await.push(recipient_id);
    }

    async fn outstanding_where(&self, due: impl Fn(NaiveDate) -> bool) -> Vec<LoanRecord> {
        let mut loans: Vec<LoanRecord> = self
            .loans
            .lock()
            .await
            .iter()
            .filter(|l| l.status.is_outstanding() && due(l.due_date))
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.due_date);
        loans
    }
}

#[async_trait]
impl LoanSource for MemoryLoanSource {
    async fn overdue_loans(&self, today: NaiveDate) -> Result<Vec<LoanRecord>, AppError> {
        Ok(self.outstanding_where(|due| due < today).await)
    }

    async fn loans_due_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LoanRecord>, AppError> {
        Ok(self.outstanding_where(|due| from <= due && due <= to).await)
    }

    async fn active_recipients(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(self.active.lock().await.clone())
    }
}
