//! Notification delivery and reminder engine.
//!
//! - [`rate_limit`]: in-flight estimate gating batch pulls
//! - [`processor`]: batch cycle and per-notification state machine
//! - [`reminder`]: reminder synthesis from loan data
//! - [`store`]: queue, device registry and loan source capabilities

pub mod processor;
pub mod rate_limit;
pub mod reminder;
pub mod store;

pub use processor::{BatchProcessor, CycleReport, SkipReason};
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use reminder::{ReminderGenerator, ReminderReport, ReminderSchedule};
