//! Batch processor — drains the notification queue.
//!
//! Each cycle:
//! 1. Asks the `RateLimiter` for admission (refused → skip the cycle)
//! 2. Pulls up to `batch_limit` pending records, oldest first
//! 3. Drives every record through `pending → processing → {sent, pending, failed}`
//! 4. Releases the limiter by the records that reached a terminal status
//!
//! One record's failure never aborts the batch. Delivery fan-out to a
//! recipient's devices is independent per device, and a single accepted
//! delivery marks the record `sent`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use loanpush_common::error::AppError;
use loanpush_common::types::{NotificationRecord, PushPayload, StatusUpdate};
use loanpush_notifier::DeliveryTransport;

use crate::rate_limit::RateLimiter;
use crate::store::{DeviceRegistry, DeviceSubscription, QueueStore};

/// Error message stored when a recipient has no registered devices.
pub const NO_DEVICES_MESSAGE: &str = "no device subscriptions registered for recipient";

/// Error message stored when a record arrives with its retry budget spent.
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "retry budget exhausted before delivery";

/// Why a cycle did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited,
    QueueUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::RateLimited => write!(f, "rate limit exceeded"),
            SkipReason::QueueUnavailable => write!(f, "queue store unavailable"),
        }
    }
}

/// Aggregate outcome of one batch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Records picked up this cycle.
    pub processed: usize,
    pub sent: usize,
    /// Records returned to `pending` for a later cycle.
    pub retried: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
}

impl CycleReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Records that reached `sent` or `failed`.
    pub fn completed(&self) -> usize {
        self.sent + self.failed
    }
}

/// Final disposition of one record within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Sent,
    Retry,
    Failed,
}

/// Drives queued notifications to their devices.
pub struct BatchProcessor {
    queue: Arc<dyn QueueStore>,
    devices: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn DeliveryTransport>,
    limiter: Arc<RateLimiter>,
    batch_limit: usize,
}

impl BatchProcessor {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        devices: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn DeliveryTransport>,
        limiter: Arc<RateLimiter>,
        batch_limit: usize,
    ) -> Self {
        Self {
            queue,
            devices,
            transport,
            limiter,
            batch_limit,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Run one batch cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        if !self.limiter.admit(self.batch_limit) {
            tracing::warn!(
                estimate = self.limiter.estimate(),
                ceiling = self.limiter.ceiling(),
                "Skipping batch cycle, rate limit exceeded"
            );
            return CycleReport::skipped(SkipReason::RateLimited);
        }

        let records = match self.queue.select_pending(self.batch_limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch pending notifications");
                return CycleReport::skipped(SkipReason::QueueUnavailable);
            }
        };

        // An empty fetch resets the estimate to zero.
        self.limiter.set_estimate(records.len());

        if records.is_empty() {
            return CycleReport::default();
        }

        let mut report = CycleReport::default();
        for record in &records {
            report.processed += 1;

            let outcome = match self.process_record(record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        notification_id = %record.id,
                        error = %e,
                        "Unexpected fault while processing notification"
                    );
                    self.force_failed(record, &e.to_string()).await;
                    RecordOutcome::Failed
                }
            };

            match outcome {
                RecordOutcome::Sent => report.sent += 1,
                RecordOutcome::Retry => report.retried += 1,
                RecordOutcome::Failed => report.failed += 1,
            }
        }

        self.limiter.release(report.completed());
        report
    }

    /// Drive one record through the state machine.
    async fn process_record(&self, record: &NotificationRecord) -> Result<RecordOutcome, AppError> {
        if record.retry_count >= record.max_retries {
            self.queue
                .update(
                    record.id,
                    &StatusUpdate::Failed {
                        error_message: RETRIES_EXHAUSTED_MESSAGE.to_string(),
                    },
                )
                .await?;
            return Ok(RecordOutcome::Failed);
        }

        // Counted before any delivery so a crash leaves a visible attempt.
        let attempt = record.retry_count + 1;
        self.queue
            .update(record.id, &StatusUpdate::Processing { retry_count: attempt })
            .await?;

        let devices = self.devices.select_by_recipient(record.recipient_id).await?;
        if devices.is_empty() {
            tracing::info!(
                notification_id = %record.id,
                recipient_id = %record.recipient_id,
                "No devices registered, failing notification"
            );
            self.queue
                .update(
                    record.id,
                    &StatusUpdate::Failed {
                        error_message: NO_DEVICES_MESSAGE.to_string(),
                    },
                )
                .await?;
            return Ok(RecordOutcome::Failed);
        }

        let payload = serde_json::to_vec(&PushPayload::from_record(record))?;

        let mut delivered = 0usize;
        let mut failures = Vec::new();
        for device in &devices {
            match self.deliver_to(device, &payload).await {
                Ok(()) => delivered += 1,
                Err(reason) => failures.push(reason),
            }
        }

        if delivered > 0 {
            self.queue
                .update(record.id, &StatusUpdate::Sent { sent_at: Utc::now() })
                .await?;

            tracing::info!(
                notification_id = %record.id,
                recipient_id = %record.recipient_id,
                delivered,
                failed = failures.len(),
                "Notification sent"
            );
            return Ok(RecordOutcome::Sent);
        }

        let error_message = format!(
            "all {} deliveries failed: {}",
            devices.len(),
            failures.join("; ")
        );

        if attempt < record.max_retries {
            tracing::warn!(
                notification_id = %record.id,
                attempt,
                max_retries = record.max_retries,
                error = %error_message,
                "Delivery failed, will retry"
            );
            self.queue
                .update(record.id, &StatusUpdate::Retry { error_message })
                .await?;
            Ok(RecordOutcome::Retry)
        } else {
            tracing::warn!(
                notification_id = %record.id,
                attempt,
                error = %error_message,
                "Delivery failed, retries exhausted"
            );
            self.queue
                .update(record.id, &StatusUpdate::Failed { error_message })
                .await?;
            Ok(RecordOutcome::Failed)
        }
    }

    /// Deliver to a single device, pruning it when it can never succeed.
    async fn deliver_to(&self, device: &DeviceSubscription, payload: &[u8]) -> Result<(), String> {
        let target = match &device.target {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(
                    recipient_id = %device.recipient_id,
                    error = %e,
                    "Unusable device descriptor"
                );
                self.prune(device).await;
                return Err(e.to_string());
            }
        };

        match self.transport.deliver(target, payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!(
                    recipient_id = %device.recipient_id,
                    endpoint = %target.endpoint,
                    error = %e,
                    "Delivery attempt failed"
                );
                if e.is_gone() {
                    self.prune(device).await;
                }
                Err(e.to_string())
            }
        }
    }

    /// Remove a dead subscription from the registry. Failures are logged only.
    async fn prune(&self, device: &DeviceSubscription) {
        match self.devices.delete_by_descriptor(&device.descriptor).await {
            Ok(removed) => tracing::info!(
                recipient_id = %device.recipient_id,
                removed,
                "Pruned invalid device subscription"
            ),
            Err(e) => tracing::warn!(
                recipient_id = %device.recipient_id,
                error = %e,
                "Failed to prune invalid device subscription"
            ),
        }
    }

    async fn force_failed(&self, record: &NotificationRecord, reason: &str) {
        let update = StatusUpdate::Failed {
            error_message: reason.to_string(),
        };
        if let Err(e) = self.queue.update(record.id, &update).await {
            tracing::error!(
                notification_id = %record.id,
                error = %e,
                "Could not mark notification as failed"
            );
        }
    }
}
