//! Postgres-backed stores.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use loanpush_common::error::AppError;
use loanpush_common::types::{
    LoanRecord, NewNotification, NotificationRecord, NotificationStatus, StatusUpdate,
};

use super::{DeviceRegistry, DeviceSubscription, LoanSource, QueueStore};

/// `notifications` table.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn select_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, AppError> {
        let records: Vec<NotificationRecord> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, title, body, payload, status, retry_count, max_retries,
                   error_message, created_at, sent_at
            FROM notifications
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(NotificationStatus::Pending.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update(&self, id: Uuid, update: &StatusUpdate) -> Result<(), AppError> {
        let status = update.status().to_string();

        let result = match update {
            StatusUpdate::Processing { retry_count } => {
                sqlx::query("UPDATE notifications SET status = $1, retry_count = $2 WHERE id = $3")
                    .bind(&status)
                    .bind(retry_count)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            StatusUpdate::Sent { sent_at } => {
                sqlx::query(
                    "UPDATE notifications SET status = $1, sent_at = $2, error_message = NULL WHERE id = $3",
                )
                .bind(&status)
                .bind(sent_at)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            StatusUpdate::Retry { error_message } | StatusUpdate::Failed { error_message } => {
                sqlx::query("UPDATE notifications SET status = $1, error_message = $2 WHERE id = $3")
                    .bind(&status)
                    .bind(error_message)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        Ok(())
    }

    async fn insert(&self, notification: NewNotification) -> Result<Uuid, AppError> {
        let record = notification.into_record(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, title, body, payload, status, retry_count, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.recipient_id)
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.payload)
        .bind(record.status.to_string())
        .bind(record.retry_count)
        .bind(record.max_retries)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record.id)
    }
}

/// `push_subscriptions` table.
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn select_by_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<DeviceSubscription>, AppError> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, subscription FROM push_subscriptions WHERE user_id = $1 ORDER BY id",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, descriptor)| DeviceSubscription::new(user_id, descriptor))
            .collect())
    }

    async fn delete_by_descriptor(&self, descriptor: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE subscription = $1")
            .bind(descriptor)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// `loans` and `users` tables.
#[derive(Clone)]
pub struct PgLoanSource {
    pool: PgPool,
}

impl PgLoanSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanSource for PgLoanSource {
    async fn overdue_loans(&self, today: NaiveDate) -> Result<Vec<LoanRecord>, AppError> {
        let loans: Vec<LoanRecord> = sqlx::query_as(
            r#"
            SELECT user_id AS recipient_id, item_name, due_date, status
            FROM loans
            WHERE status IN ('borrowed', 'overdue')
              AND due_date < $1
            ORDER BY due_date ASC, id ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn loans_due_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LoanRecord>, AppError> {
        let loans: Vec<LoanRecord> = sqlx::query_as(
            r#"
            SELECT user_id AS recipient_id, item_name, due_date, status
            FROM loans
            WHERE status IN ('borrowed', 'overdue')
              AND due_date BETWEEN $1 AND $2
            ORDER BY due_date ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn active_recipients(&self) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE is_active = true ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
