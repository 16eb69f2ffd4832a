use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a queued notification.
///
/// Transitions only `pending → processing → {sent, pending, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl NotificationStatus {
    /// `sent` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Failed)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Processing => write!(f, "processing"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Tag distinguishing the purpose of a synthesized notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    OverdueReminder,
    DueSoonReminder,
    OfficeClosing,
    GoodMorning,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::OverdueReminder => "overdue_reminder",
            ReminderKind::DueSoonReminder => "due_soon_reminder",
            ReminderKind::OfficeClosing => "office_closing",
            ReminderKind::GoodMorning => "good_morning",
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification record in the delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    /// Arbitrary structured data forwarded to the device as `data`.
    pub payload: Option<serde_json::Value>,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A notification about to be enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub payload: Option<serde_json::Value>,
    pub max_retries: i32,
}

impl NewNotification {
    /// Materialize a pending record with a fresh id.
    pub fn into_record(self, created_at: DateTime<Utc>) -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            recipient_id: self.recipient_id,
            title: self.title,
            body: self.body,
            payload: self.payload,
            status: NotificationStatus::Pending,
            retry_count: 0,
            max_retries: self.max_retries,
            error_message: None,
            created_at,
            sent_at: None,
        }
    }
}

/// A single status transition applied to a queued notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Picked up by a batch cycle; carries the incremented retry count.
    Processing { retry_count: i32 },
    /// At least one device accepted the message.
    Sent { sent_at: DateTime<Utc> },
    /// Every delivery failed but retries remain.
    Retry { error_message: String },
    /// Terminal failure.
    Failed { error_message: String },
}

impl StatusUpdate {
    /// Status the record holds after this update.
    pub fn status(&self) -> NotificationStatus {
        match self {
            StatusUpdate::Processing { .. } => NotificationStatus::Processing,
            StatusUpdate::Sent { .. } => NotificationStatus::Sent,
            StatusUpdate::Retry { .. } => NotificationStatus::Pending,
            StatusUpdate::Failed { .. } => NotificationStatus::Failed,
        }
    }

    /// Apply the update to an in-memory record.
    pub fn apply(&self, record: &mut NotificationRecord) {
        record.status = self.status();
        match self {
            StatusUpdate::Processing { retry_count } => record.retry_count = *retry_count,
            StatusUpdate::Sent { sent_at } => {
                record.sent_at = Some(*sent_at);
                record.error_message = None;
            }
            StatusUpdate::Retry { error_message } | StatusUpdate::Failed { error_message } => {
                record.error_message = Some(error_message.clone());
            }
        }
    }
}

/// Body delivered to each device: `{title, body, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl PushPayload {
    /// Build the device payload for a record; missing data becomes `{}`.
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            title: record.title.clone(),
            body: record.body.clone(),
            data: record
                .payload
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

/// Loan status as stored by the lending platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Overdue,
    Returned,
}

impl LoanStatus {
    /// Whether the item is still out with the borrower.
    pub fn is_outstanding(self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::Overdue)
    }
}

/// A loan row as seen by the reminder generator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRecord {
    pub recipient_id: Uuid,
    pub item_name: String,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NotificationRecord {
        NewNotification {
            recipient_id: Uuid::new_v4(),
            title: "Overdue equipment".to_string(),
            body: "Please return: Tripod".to_string(),
            payload: None,
            max_retries: 3,
        }
        .into_record(Utc::now())
    }

    #[test]
    fn test_new_record_is_pending() {
        let rec = record();
        assert_eq!(rec.status, NotificationStatus::Pending);
        assert_eq!(rec.retry_count, 0);
        assert!(rec.sent_at.is_none());
    }

    #[test]
    fn test_apply_retry_keeps_count_and_sets_error() {
        let mut rec = record();
        StatusUpdate::Processing { retry_count: 1 }.apply(&mut rec);
        StatusUpdate::Retry {
            error_message: "relay unavailable".to_string(),
        }
        .apply(&mut rec);
        assert_eq!(rec.status, NotificationStatus::Pending);
        assert_eq!(rec.retry_count, 1);
        assert_eq!(rec.error_message.as_deref(), Some("relay unavailable"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(NotificationStatus::Sent.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(!NotificationStatus::Processing.is_terminal());
    }

    #[test]
    fn test_payload_defaults_data_to_empty_object() {
        let payload = PushPayload::from_record(&record());
        assert_eq!(payload.data, serde_json::json!({}));
    }

    #[test]
    fn test_reminder_kind_tags() {
        assert_eq!(ReminderKind::OverdueReminder.to_string(), "overdue_reminder");
        assert_eq!(ReminderKind::DueSoonReminder.to_string(), "due_soon_reminder");
        assert_eq!(ReminderKind::OfficeClosing.to_string(), "office_closing");
        assert_eq!(ReminderKind::GoodMorning.to_string(), "good_morning");
    }

    #[test]
    fn test_outstanding_loans() {
        assert!(LoanStatus::Borrowed.is_outstanding());
        assert!(LoanStatus::Overdue.is_outstanding());
        assert!(!LoanStatus::Returned.is_outstanding());
    }
}
