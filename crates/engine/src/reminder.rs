//! Reminder generator — synthesizes queue entries from loan data.
//!
//! Four independent sub-tasks run on every invocation:
//! - overdue: outstanding loans due before today, one notification per recipient
//! - due-soon: outstanding loans due within `[today, today + due_soon_days]`
//! - office-closing broadcast, only during the configured local hour
//! - good-morning broadcast, only during the configured local hour
//!
//! A failing sub-task is logged and recorded in the report; the others still run.
//! Nothing here remembers earlier runs, so invoking the generator twice within
//! the gating hour enqueues the broadcasts twice.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Timelike, Utc};
use serde::Serialize;
use uuid::Uuid;

use loanpush_common::config::AppConfig;
use loanpush_common::error::AppError;
use loanpush_common::types::{LoanRecord, NewNotification, ReminderKind};

use crate::store::{LoanSource, QueueStore};

/// Recipient → distinct item names in first-seen order.
pub type ReminderAggregate = BTreeMap<Uuid, Vec<String>>;

/// When and how reminders are produced.
#[derive(Debug, Clone)]
pub struct ReminderSchedule {
    pub office_closing_hour: u32,
    pub good_morning_hour: u32,
    /// Offset that defines "today" and the local hour.
    pub utc_offset: FixedOffset,
    pub due_soon_days: i64,
    /// `max_retries` stamped on every synthesized record.
    pub max_retries: i32,
}

impl ReminderSchedule {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let utc_offset = FixedOffset::east_opt(config.reminder_utc_offset_minutes * 60)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "REMINDER_UTC_OFFSET_MINUTES out of range: {}",
                    config.reminder_utc_offset_minutes
                ))
            })?;

        Ok(Self {
            office_closing_hour: config.office_closing_hour,
            good_morning_hour: config.good_morning_hour,
            utc_offset,
            due_soon_days: config.due_soon_days,
            max_retries: config.default_max_retries,
        })
    }
}

/// Counts of notifications enqueued per kind during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub overdue: usize,
    pub due_soon: usize,
    pub office_closing: usize,
    pub good_morning: usize,
    /// Sub-tasks that aborted on a collaborator error.
    pub failed_tasks: Vec<ReminderKind>,
}

impl ReminderReport {
    pub fn enqueued(&self) -> usize {
        self.overdue + self.due_soon + self.office_closing + self.good_morning
    }
}

/// Group loans per recipient, keeping each item name once.
pub fn aggregate_items(loans: &[LoanRecord]) -> ReminderAggregate {
    let mut grouped = ReminderAggregate::new();
    for loan in loans {
        let names = grouped.entry(loan.recipient_id).or_default();
        if !names.iter().any(|n| n == &loan.item_name) {
            names.push(loan.item_name.clone());
        }
    }
    grouped
}

/// Title and body for a reminder kind.
pub fn reminder_text(
    kind: ReminderKind,
    items: &[String],
    due_soon_days: i64,
) -> (String, String) {
    let joined = items.join(", ");
    match kind {
        ReminderKind::OverdueReminder => (
            "Overdue equipment".to_string(),
            format!("Please return: {}", joined),
        ),
        ReminderKind::DueSoonReminder => (
            "Equipment due soon".to_string(),
            format!("Due within {} days: {}", due_soon_days, joined),
        ),
        ReminderKind::OfficeClosing => (
            "Office closing".to_string(),
            "The equipment office is closing soon. Please return borrowed items before closing."
                .to_string(),
        ),
        ReminderKind::GoodMorning => (
            "Good morning".to_string(),
            "Good morning! The equipment office is open.".to_string(),
        ),
    }
}

/// Enqueues reminder notifications from loan data.
pub struct ReminderGenerator {
    loans: Arc<dyn LoanSource>,
    queue: Arc<dyn QueueStore>,
    schedule: ReminderSchedule,
}

impl ReminderGenerator {
    pub fn new(
        loans: Arc<dyn LoanSource>,
        queue: Arc<dyn QueueStore>,
        schedule: ReminderSchedule,
    ) -> Self {
        Self {
            loans,
            queue,
            schedule,
        }
    }

    /// Run every sub-task for the instant `now`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> ReminderReport {
        let local = now.with_timezone(&self.schedule.utc_offset);
        let today = local.date_naive();
        let hour = local.hour();

        let mut report = ReminderReport::default();

        report.overdue = settle(
            ReminderKind::OverdueReminder,
            self.enqueue_overdue(today).await,
            &mut report.failed_tasks,
        );
        report.due_soon = settle(
            ReminderKind::DueSoonReminder,
            self.enqueue_due_soon(today).await,
            &mut report.failed_tasks,
        );

        if hour == self.schedule.office_closing_hour {
            report.office_closing = settle(
                ReminderKind::OfficeClosing,
                self.broadcast(ReminderKind::OfficeClosing).await,
                &mut report.failed_tasks,
            );
        }
        if hour == self.schedule.good_morning_hour {
            report.good_morning = settle(
                ReminderKind::GoodMorning,
                self.broadcast(ReminderKind::GoodMorning).await,
                &mut report.failed_tasks,
            );
        }

        report
    }

    async fn enqueue_overdue(&self, today: NaiveDate) -> Result<usize, AppError> {
        let loans = self.loans.overdue_loans(today).await?;
        self.enqueue_grouped(ReminderKind::OverdueReminder, &loans).await
    }

    async fn enqueue_due_soon(&self, today: NaiveDate) -> Result<usize, AppError> {
        let until = today
            .checked_add_signed(TimeDelta::days(self.schedule.due_soon_days))
            .ok_or_else(|| AppError::Internal("due-soon window overflows the calendar".into()))?;
        let loans = self.loans.loans_due_between(today, until).await?;
        self.enqueue_grouped(ReminderKind::DueSoonReminder, &loans).await
    }

    async fn enqueue_grouped(
        &self,
        kind: ReminderKind,
        loans: &[LoanRecord],
    ) -> Result<usize, AppError> {
        let aggregate = aggregate_items(loans);

        for (recipient_id, items) in &aggregate {
            let (title, body) = reminder_text(kind, items, self.schedule.due_soon_days);
            self.queue
                .insert(NewNotification {
                    recipient_id: *recipient_id,
                    title,
                    body,
                    payload: Some(serde_json::json!({
                        "type": kind,
                        "items": items,
                    })),
                    max_retries: self.schedule.max_retries,
                })
                .await?;
        }

        Ok(aggregate.len())
    }

    async fn broadcast(&self, kind: ReminderKind) -> Result<usize, AppError> {
        let recipients: BTreeSet<Uuid> = self
            .loans
            .active_recipients()
            .await?
            .into_iter()
            .collect();

        let (title, body) = reminder_text(kind, &[], self.schedule.due_soon_days);
        for recipient_id in &recipients {
            self.queue
                .insert(NewNotification {
                    recipient_id: *recipient_id,
                    title: title.clone(),
                    body: body.clone(),
                    payload: Some(serde_json::json!({ "type": kind })),
                    max_retries: self.schedule.max_retries,
                })
                .await?;
        }

        Ok(recipients.len())
    }
}

fn settle(
    kind: ReminderKind,
    result: Result<usize, AppError>,
    failed: &mut Vec<ReminderKind>,
) -> usize {
    match result {
        Ok(count) => {
            if count > 0 {
                tracing::info!(kind = %kind, count, "Reminders enqueued");
            }
            count
        }
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "Reminder sub-task failed");
            failed.push(kind);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanpush_common::types::LoanStatus;

    fn loan(recipient_id: Uuid, item: &str) -> LoanRecord {
        LoanRecord {
            recipient_id,
            item_name: item.to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            status: LoanStatus::Borrowed,
        }
    }

    #[test]
    fn test_aggregate_deduplicates_per_recipient() {
        let r = Uuid::new_v4();
        let grouped = aggregate_items(&[loan(r, "Tripod"), loan(r, "Tripod")]);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&r], vec!["Tripod".to_string()]);
    }

    #[test]
    fn test_aggregate_keeps_first_seen_order() {
        let r = Uuid::new_v4();
        let grouped = aggregate_items(&[
            loan(r, "Tripod"),
            loan(r, "Camera"),
            loan(r, "Tripod"),
            loan(r, "Light"),
        ]);
        assert_eq!(grouped[&r], vec!["Tripod", "Camera", "Light"]);
    }

    #[test]
    fn test_aggregate_separates_recipients() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let grouped = aggregate_items(&[loan(a, "Tripod"), loan(b, "Tripod")]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&a], vec!["Tripod"]);
        assert_eq!(grouped[&b], vec!["Tripod"]);
    }

    #[test]
    fn test_reminder_text_joins_items() {
        let items = vec!["Tripod".to_string(), "Camera".to_string()];
        let (title, body) = reminder_text(ReminderKind::OverdueReminder, &items, 2);
        assert_eq!(title, "Overdue equipment");
        assert_eq!(body, "Please return: Tripod, Camera");

        let (_, body) = reminder_text(ReminderKind::DueSoonReminder, &items, 2);
        assert_eq!(body, "Due within 2 days: Tripod, Camera");
    }

    #[test]
    fn test_report_enqueued_total() {
        let report = ReminderReport {
            overdue: 2,
            due_soon: 1,
            office_closing: 0,
            good_morning: 4,
            failed_tasks: vec![],
        };
        assert_eq!(report.enqueued(), 7);
    }
}
