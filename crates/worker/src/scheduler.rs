//! Scheduler adapter: runs the batch processor and the reminder generator on
//! fixed cadences.
//!
//! Each job type gets its own task and awaits its cycle before taking the next
//! tick, so cycles of one job never overlap. Missed ticks are skipped rather
//! than replayed. The shutdown flag is only checked between cycles: a cycle
//! already running finishes its collaborator calls untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use loanpush_engine::{BatchProcessor, CycleReport, ReminderGenerator, ReminderReport};

use crate::state::HealthState;

/// Owns the two jobs and their cadences.
pub struct Scheduler {
    processor: Arc<BatchProcessor>,
    reminders: Arc<ReminderGenerator>,
    health: HealthState,
    batch_every: Duration,
    reminders_every: Duration,
}

impl Scheduler {
    pub fn new(
        processor: Arc<BatchProcessor>,
        reminders: Arc<ReminderGenerator>,
        health: HealthState,
        batch_every: Duration,
        reminders_every: Duration,
    ) -> Self {
        Self {
            processor,
            reminders,
            health,
            batch_every,
            reminders_every,
        }
    }

    /// Run one batch cycle and publish its report.
    pub async fn run_batch_once(&self) -> CycleReport {
        run_batch(&self.processor, &self.health).await
    }

    /// Run one reminder cycle for the current instant and publish its report.
    pub async fn run_reminders_once(&self) -> ReminderReport {
        run_reminders(&self.reminders, &self.health).await
    }

    /// Spawn both jobs. They stop once `shutdown` flips to `true`.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            batch_every_secs = self.batch_every.as_secs_f64(),
            reminders_every_secs = self.reminders_every.as_secs_f64(),
            "Scheduler started"
        );

        let processor = self.processor.clone();
        let health = self.health.clone();
        let batch = tokio::spawn(run_periodic(
            "batch",
            self.batch_every,
            shutdown.clone(),
            move || {
                let processor = processor.clone();
                let health = health.clone();
                async move {
                    run_batch(&processor, &health).await;
                }
            },
        ));

        let reminders = self.reminders.clone();
        let health = self.health.clone();
        let reminder = tokio::spawn(run_periodic(
            "reminders",
            self.reminders_every,
            shutdown,
            move || {
                let reminders = reminders.clone();
                let health = health.clone();
                async move {
                    run_reminders(&reminders, &health).await;
                }
            },
        ));

        vec![batch, reminder]
    }
}

async fn run_batch(processor: &BatchProcessor, health: &HealthState) -> CycleReport {
    let report = processor.run_cycle().await;

    if report.processed > 0 {
        tracing::info!(
            processed = report.processed,
            sent = report.sent,
            retried = report.retried,
            failed = report.failed,
            "Batch cycle finished"
        );
    } else {
        tracing::debug!(skipped = ?report.skipped, "Batch cycle found no work");
    }

    health.record_batch(report.clone()).await;
    report
}

async fn run_reminders(generator: &ReminderGenerator, health: &HealthState) -> ReminderReport {
    let report = generator.run_cycle(Utc::now()).await;

    if report.enqueued() > 0 || !report.failed_tasks.is_empty() {
        tracing::info!(
            overdue = report.overdue,
            due_soon = report.due_soon,
            office_closing = report.office_closing,
            good_morning = report.good_morning,
            failed_tasks = ?report.failed_tasks,
            "Reminder cycle finished"
        );
    } else {
        tracing::debug!("Reminder cycle enqueued nothing");
    }

    health.record_reminders(report.clone()).await;
    report
}

/// Tick `cycle` every `period` until `shutdown` becomes true.
async fn run_periodic<F, Fut>(
    job: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // A dropped sender means nobody can resume us.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        if *shutdown.borrow() {
            break;
        }

        cycle().await;
    }

    tracing::info!(job, "Scheduler job stopped");
}

/// Flip the shutdown flag and wait up to `grace` for the jobs to wind down.
///
/// Returns `false` when the grace window elapsed first.
pub async fn shutdown(
    sender: &watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    grace: Duration,
) -> bool {
    let _ = sender.send(true);

    let drained = tokio::time::timeout(grace, async {
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler job panicked");
            }
        }
    })
    .await;

    match drained {
        Ok(()) => {
            tracing::info!("Scheduler jobs finished");
            true
        }
        Err(_) => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Grace window elapsed with cycles still running"
            );
            false
        }
    }
}
