//! Mock clock for testing.

use crate::application::ports::Clock;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling
/// deterministic testing of dedupe windows and the maintenance interval.
///
/// # Examples
///
/// ```
/// use bot_insight::infrastructure::mocks::MockClock;
/// use bot_insight::application::ports::Clock;
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
///
/// let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// let clock = MockClock::new(start);
/// assert_eq!(clock.now(), start);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + chrono::Duration::seconds(10));
///
/// let later = start + chrono::Duration::days(3);
/// clock.set(later);
/// assert_eq!(clock.now(), later);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `step`.
    pub fn advance(&self, step: Duration) {
        let step = chrono::Duration::from_std(step)
            .expect("MockClock advance out of range for chrono::Duration");
        *self.lock() += step;
    }

    /// Jump to `time`, backwards included.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.lock() = time;
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_can_rewind() {
        let start = Utc::now();
        let clock = MockClock::new(start);

        let earlier = start - chrono::Duration::hours(2);
        clock.set(earlier);
        assert_eq!(clock.now(), earlier);
    }

    #[test]
    fn test_clones_share_time() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        let clone = clock.clone();

        thread::spawn(move || clone.advance(Duration::from_secs(5)))
            .join()
            .unwrap();

        assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
    }
}
