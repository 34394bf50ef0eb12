use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of "now" for every component that reasons about cooldowns,
/// durations and schedules (spec §4.5, §4.6, §4.9). Abstracted so tests can
/// drive time deterministically instead of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is set explicitly, for deterministic unit tests of
/// cooldowns, rule durations and idle windows.
#[derive(Debug)]
pub struct TestClock {
    millis_since_epoch: AtomicI64,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            millis_since_epoch: AtomicI64::new(start.timestamp_millis()),
        })
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis_since_epoch
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.millis_since_epoch
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis_since_epoch.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}

pub fn generate_short_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = TestClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(60));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
