//! Shared helpers: timestamps and the injectable clock.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::{Arc, Mutex};

/// Stored timestamps are fixed-width RFC 3339 so that SQL string ordering
/// matches chronological ordering.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_iso(&self) -> String {
        format_timestamp(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests that cross rate-limit
/// windows or need distinct creation timestamps.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 9).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2024-01-01T00:00:09.000000Z");
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(61));
    }
}
