use std::sync::Mutex;

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::AppError;

const MS_PER_DAY: i128 = 86_400_000;

/// Source of "now" for the ledger.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format as RFC3339 UTC truncated to milliseconds, e.g. `2026-10-18T09:15:02.123Z`.
pub fn format_timestamp(dt: OffsetDateTime) -> Result<String, AppError> {
    let utc = dt.to_offset(UtcOffset::UTC);
    let millis = utc
        .replace_nanosecond(utc.millisecond() as u32 * 1_000_000)
        .map_err(|e| {
            AppError::new("TIME_FORMAT_FAILED", "Failed to truncate timestamp")
                .with_details(e.to_string())
        })?;
    millis.format(&Rfc3339).map_err(|e| {
        AppError::new("TIME_FORMAT_FAILED", "Failed to format timestamp").with_details(e.to_string())
    })
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|e| {
        AppError::new("TIME_PARSE_FAILED", "Failed to parse stored timestamp")
            .with_details(format!("value={raw}; err={e}"))
    })
}

/// Whole days between `last_reset` and `now`, rounded down.
///
/// A `last_reset` later than `now` counts as zero days.
pub fn days_elapsed(last_reset: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let diff_ms = (now - last_reset).whole_milliseconds();
    if diff_ms <= 0 {
        return 0;
    }
    (diff_ms / MS_PER_DAY) as i64
}
