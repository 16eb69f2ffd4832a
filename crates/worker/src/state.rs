//! Shared state read by the health route and written by the scheduler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use loanpush_engine::{CycleReport, RateLimiter, ReminderReport, SkipReason};

/// A report together with when it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun<T> {
    pub finished_at: DateTime<Utc>,
    pub report: T,
}

/// Most recent outcome of each scheduled job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub last_batch: Option<JobRun<CycleReport>>,
    pub last_reminders: Option<JobRun<ReminderReport>>,
}

impl HealthSnapshot {
    /// `degraded` when the last runs hit a collaborator outage.
    pub fn status(&self) -> &'static str {
        let queue_down = self
            .last_batch
            .as_ref()
            .is_some_and(|run| run.report.skipped == Some(SkipReason::QueueUnavailable));
        let reminders_failing = self
            .last_reminders
            .as_ref()
            .is_some_and(|run| !run.report.failed_tasks.is_empty());

        if queue_down || reminders_failing {
            "degraded"
        } else {
            "ok"
        }
    }
}

#[derive(Clone, Default)]
pub struct HealthState {
    inner: Arc<RwLock<HealthSnapshot>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_batch(&self, report: CycleReport) {
        self.inner.write().await.last_batch = Some(JobRun {
            finished_at: Utc::now(),
            report,
        });
    }

    pub async fn record_reminders(&self, report: ReminderReport) {
        self.inner.write().await.last_reminders = Some(JobRun {
            finished_at: Utc::now(),
            report,
        });
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().await.clone()
    }
}

/// Application state shared across route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub health: HealthState,
    pub batch_size: usize,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, health: HealthState, batch_size: usize) -> Self {
        Self {
            limiter,
            health,
            batch_size,
        }
    }
}
