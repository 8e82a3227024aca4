// =============================================================================
// Clock abstraction — wall-clock time and WIB reset boundaries
// =============================================================================
//
// All time-dependent components (daily-loss tracker, circuit breaker, balance
// cache) take an `Arc<dyn Clock>` so their behaviour is deterministic under
// test. Production code uses `SystemClock`.
// =============================================================================

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Western Indonesia Time, UTC+7. Daily-loss counters reset at 00:00 WIB.
pub const WIB_OFFSET_SECS: i32 = 7 * 3600;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Milliseconds since the UNIX epoch.
    fn epoch_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// Production clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The next 00:00 WIB boundary strictly after `now`.
///
/// Computed from the UTC+7 civil date, so the result is correct on month and
/// year rollovers and never lands in the past near the boundary.
pub fn next_wib_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let wib = FixedOffset::east_opt(WIB_OFFSET_SECS).expect("UTC+7 is a valid offset");
    let local = now.with_timezone(&wib);
    let next_day = local
        .date_naive()
        .succ_opt()
        .expect("date arithmetic stays in range");
    let midnight = next_day
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    wib.from_local_datetime(&midnight)
        .single()
        .expect("fixed-offset datetimes are unambiguous")
        .with_timezone(&Utc)
}

/// Test clock whose time is advanced manually.
#[cfg(test)]
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn next_reset_is_strictly_after_now() {
        // 10:00 UTC = 17:00 WIB; next 00:00 WIB is 17:00 UTC the same day.
        let now = utc(2026, 1, 15, 10, 0, 0);
        assert_eq!(next_wib_midnight(now), utc(2026, 1, 15, 17, 0, 0));

        // 20:00 UTC = 03:00 WIB next civil day; next reset is 17:00 UTC
        // on the 16th.
        let now = utc(2026, 1, 15, 20, 0, 0);
        assert_eq!(next_wib_midnight(now), utc(2026, 1, 16, 17, 0, 0));
    }

    #[test]
    fn exactly_at_midnight_wib_rolls_to_next_day() {
        // 17:00 UTC is exactly 00:00 WIB; the next boundary must be a full
        // day later, never "now".
        let now = utc(2026, 1, 15, 17, 0, 0);
        assert_eq!(next_wib_midnight(now), utc(2026, 1, 16, 17, 0, 0));
    }

    #[test]
    fn reset_crosses_month_boundary() {
        let now = utc(2026, 1, 31, 18, 0, 0); // 01:00 WIB on Feb 1
        assert_eq!(next_wib_midnight(now), utc(2026, 2, 1, 17, 0, 0));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(utc(2026, 1, 15, 10, 0, 0));
        assert_eq!(clock.now_utc(), utc(2026, 1, 15, 10, 0, 0));
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now_utc(), utc(2026, 1, 15, 10, 1, 30));
    }
}
