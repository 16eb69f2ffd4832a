use serde::Deserialize;

/// Global worker configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Seconds to wait for a pooled connection before giving up (default: 5)
    pub db_acquire_timeout_secs: u64,

    /// HTTP relay that signs and forwards web-push messages
    pub push_relay_url: String,

    /// Bearer token presented to the push relay
    pub push_relay_token: Option<String>,

    /// TTL forwarded with each push message, in seconds (default: 86400)
    pub push_ttl_seconds: u32,

    /// Maximum number of pending notifications pulled per batch cycle (default: 50)
    pub batch_size: usize,

    /// Queue-size estimate at which batch pulls are refused (default: 100)
    pub rate_limit_ceiling: usize,

    /// `max_retries` stamped on synthesized reminder notifications (default: 3)
    pub default_max_retries: i32,

    /// Batch cycle cadence in seconds (default: 60)
    pub batch_interval_secs: u64,

    /// Reminder cycle cadence in seconds (default: 3600)
    pub reminder_interval_secs: u64,

    /// Local hour at which the office-closing broadcast goes out (default: 8)
    pub office_closing_hour: u32,

    /// Local hour at which the good-morning broadcast goes out (default: 9)
    pub good_morning_hour: u32,

    /// Offset from UTC, in minutes, that defines "local" for reminders (default: 0)
    pub reminder_utc_offset_minutes: i32,

    /// Width of the due-soon window in days (default: 2)
    pub due_soon_days: i64,

    /// Port for the health listener (default: 3000)
    pub health_port: u16,

    /// Grace window between the shutdown signal and process exit (default: 10)
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            db_acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", "5")?,
            push_relay_url: std::env::var("PUSH_RELAY_URL")
                .map_err(|_| anyhow::anyhow!("PUSH_RELAY_URL environment variable is required"))?,
            push_relay_token: std::env::var("PUSH_RELAY_TOKEN").ok(),
            push_ttl_seconds: parse_var("PUSH_TTL_SECONDS", "86400")?,
            batch_size: parse_var("BATCH_SIZE", "50")?,
            rate_limit_ceiling: parse_var("RATE_LIMIT_CEILING", "100")?,
            default_max_retries: parse_var("DEFAULT_MAX_RETRIES", "3")?,
            batch_interval_secs: parse_var("BATCH_INTERVAL_SECS", "60")?,
            reminder_interval_secs: parse_var("REMINDER_INTERVAL_SECS", "3600")?,
            office_closing_hour: parse_var("OFFICE_CLOSING_HOUR", "8")?,
            good_morning_hour: parse_var("GOOD_MORNING_HOUR", "9")?,
            reminder_utc_offset_minutes: parse_var("REMINDER_UTC_OFFSET_MINUTES", "0")?,
            due_soon_days: parse_var("DUE_SOON_DAYS", "2")?,
            health_port: parse_var("HEALTH_PORT", "3000")?,
            shutdown_grace_secs: parse_var("SHUTDOWN_GRACE_SECS", "10")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be greater than 0");
        }
        if self.rate_limit_ceiling == 0 {
            anyhow::bail!("RATE_LIMIT_CEILING must be greater than 0");
        }
        // A full batch of retries must leave the estimate below the ceiling,
        // otherwise no later cycle is admitted to pick them up.
        if self.batch_size >= self.rate_limit_ceiling {
            anyhow::bail!("BATCH_SIZE must be smaller than RATE_LIMIT_CEILING");
        }
        if self.db_acquire_timeout_secs == 0 {
            anyhow::bail!("DB_ACQUIRE_TIMEOUT_SECS must be greater than 0");
        }
        if self.default_max_retries < 1 {
            anyhow::bail!("DEFAULT_MAX_RETRIES must be at least 1");
        }
        if self.office_closing_hour > 23 || self.good_morning_hour > 23 {
            anyhow::bail!("OFFICE_CLOSING_HOUR and GOOD_MORNING_HOUR must be in 0..=23");
        }
        if self.batch_interval_secs == 0 || self.reminder_interval_secs == 0 {
            anyhow::bail!("BATCH_INTERVAL_SECS and REMINDER_INTERVAL_SECS must be greater than 0");
        }
        if self.due_soon_days < 0 {
            anyhow::bail!("DUE_SOON_DAYS must not be negative");
        }
        // chrono::FixedOffset accepts strictly less than one day.
        if self.reminder_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("REMINDER_UTC_OFFSET_MINUTES must be within one day");
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            db_max_connections: 5,
            db_acquire_timeout_secs: 5,
            push_relay_url: "http://unused".to_string(),
            push_relay_token: None,
            push_ttl_seconds: 60,
            batch_size: 50,
            rate_limit_ceiling: 100,
            default_max_retries: 3,
            batch_interval_secs: 60,
            reminder_interval_secs: 3600,
            office_closing_hour: 8,
            good_morning_hour: 9,
            reminder_utc_offset_minutes: 420,
            due_soon_days: 2,
            health_port: 3000,
            shutdown_grace_secs: 10,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = AppConfig {
            batch_size: 0,
            ..sample()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_batch_at_or_above_ceiling() {
        let at_ceiling = AppConfig {
            batch_size: 100,
            rate_limit_ceiling: 100,
            ..sample()
        };
        assert!(at_ceiling.validate().is_err());

        let above = AppConfig {
            batch_size: 150,
            ..sample()
        };
        assert!(above.validate().is_err());

        let just_below = AppConfig {
            batch_size: 99,
            ..sample()
        };
        assert!(just_below.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_acquire_timeout() {
        let config = AppConfig {
            db_acquire_timeout_secs: 0,
            ..sample()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_hour() {
        let config = AppConfig {
            good_morning_hour: 24,
            ..sample()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_var_uses_default() {
        let value: u64 = parse_var("LOANPUSH_TEST_UNSET_VARIABLE", "42").unwrap();
        assert_eq!(value, 42);
    }
}
