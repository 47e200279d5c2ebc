//! Time abstraction so "tomorrow" can be pinned in tests.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

// ==================== Clock Trait ====================

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Today's calendar date in `tz`.
    fn today_in(&self, tz: Tz) -> NaiveDate {
        self.now_utc().with_timezone(&tz).date_naive()
    }

    /// The day after [`Clock::today_in`], the default forecast target.
    fn tomorrow_in(&self, tz: Tz) -> NaiveDate {
        self.today_in(tz) + Duration::days(1)
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn advance(&self, duration: Duration) {
        let mut time = self.utc_time.lock().unwrap_or_else(PoisonError::into_inner);
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_system_clock_returns_current_time() {
        let clock = SystemClock;
        let before = Utc::now();
        let clock_time = clock.now_utc();
        let after = Utc::now();

        assert!(clock_time >= before);
        assert!(clock_time <= after);
    }

    #[test]
    fn test_mock_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2026, 2, 4, 10, 0, 0).unwrap();
        let clock = MockClock::new(start);
        assert_eq!(clock.now_utc(), start);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.now_utc(), Utc.with_ymd_and_hms(2026, 2, 4, 12, 0, 0).unwrap());

        clock.set_time(start);
        assert_eq!(clock.now_utc(), start);
    }

    #[test]
    fn test_today_depends_on_zone() {
        // 03:30 UTC is still the previous evening on the East Coast
        let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 2, 5, 3, 30, 0).unwrap());

        assert_eq!(
            clock.today_in(chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2026, 2, 5).unwrap()
        );
        assert_eq!(
            clock.today_in(chrono_tz::US::Eastern),
            NaiveDate::from_ymd_opt(2026, 2, 4).unwrap()
        );
        assert_eq!(
            clock.tomorrow_in(chrono_tz::US::Eastern),
            NaiveDate::from_ymd_opt(2026, 2, 5).unwrap()
        );
    }
}
