//! Abstract time source for calendar math and the job runner
//!
//! Production wires [`SysClock`]; tests wire [`ManualClock`] so schedules can
//! be driven across days without waiting on wall time.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Abstract clock used by every time-dependent component
#[async_trait]
pub trait Timebase: Send + Sync {
    /// Current wall-clock instant (UTC)
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration (virtual time for fakes)
    async fn sleep(&self, duration: Duration);
}

/// Real clock (production)
#[derive(Debug, Default, Clone, Copy)]
pub struct SysClock;

#[async_trait]
impl Timebase for SysClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Controllable clock for tests
///
/// `now()` returns the stored instant; `advance` moves it forward. `sleep`
/// yields briefly in real time so polling loops keep turning while a test
/// warps the clock underneath them.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a chrono duration
    pub fn advance(&self, delta: ChronoDuration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Jump the clock to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock();
        *now = instant;
    }
}

#[async_trait]
impl Timebase for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, _duration: Duration) {
        // Real polling loops stay responsive while tests warp the clock.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(ChronoDuration::hours(3));
        assert_eq!(clock.now(), start + ChronoDuration::hours(3));
    }

    #[test]
    fn manual_clock_sleep_returns_without_advancing() {
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        tokio_test::block_on(clock.sleep(Duration::from_secs(3600)));
        assert_eq!(clock.now(), start);
    }
}
