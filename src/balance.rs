// =============================================================================
// Balance Cache — time-bounded memoization of account equity
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bitget::VenueApi;
use crate::clock::Clock;

/// Cached equity stays valid this long.
pub const BALANCE_CACHE_TTL_SECS: u64 = 30;

/// Memoizes the last successful equity fetch. Failed fetches are never
/// cached; the caller decides what a missing balance means.
pub struct BalanceCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<(f64, DateTime<Utc>)>>,
}

impl BalanceCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::seconds(BALANCE_CACHE_TTL_SECS as i64),
            clock,
            state: Mutex::new(None),
        }
    }

    /// The cached equity, if it is still fresh.
    pub fn cached(&self) -> Option<f64> {
        let now = self.clock.now_utc();
        match *self.state.lock() {
            Some((equity, fetched_at)) if now - fetched_at < self.ttl => Some(equity),
            _ => None,
        }
    }

    /// Cached equity, or a fresh fetch through the venue. Returns `None`
    /// when the cache is stale and the fetch fails.
    pub async fn equity(&self, venue: &dyn VenueApi, margin_coin: &str) -> Option<f64> {
        if let Some(equity) = self.cached() {
            debug!(equity, "using cached wallet equity");
            return Some(equity);
        }

        match venue.account_equity(margin_coin).await {
            Ok(equity) => {
                *self.state.lock() = Some((equity, self.clock.now_utc()));
                debug!(equity, "wallet equity refreshed from venue");
                Some(equity)
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch wallet equity");
                None
            }
        }
    }
}

impl std::fmt::Debug for BalanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceCache")
            .field("ttl_secs", &self.ttl.num_seconds())
            .field("cached", &self.cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testkit::MockVenue;
    use chrono::TimeZone;

    fn setup(equity: f64) -> (Arc<ManualClock>, Arc<MockVenue>, BalanceCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let venue = Arc::new(MockVenue::new());
        venue.state.lock().equity = equity;
        let cache = BalanceCache::new(clock.clone());
        (clock, venue, cache)
    }

    #[tokio::test]
    async fn fetches_then_serves_from_cache() {
        let (_, venue, cache) = setup(1000.0);
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, Some(1000.0));

        // A second lookup inside the TTL must not hit the venue.
        venue.state.lock().equity = 500.0;
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, Some(1000.0));
        assert_eq!(venue.state.lock().equity_calls, 1);
    }

    #[tokio::test]
    async fn refetches_after_ttl() {
        let (clock, venue, cache) = setup(1000.0);
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, Some(1000.0));

        clock.advance(Duration::seconds(31));
        venue.state.lock().equity = 900.0;
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, Some(900.0));
    }

    #[tokio::test]
    async fn failure_returns_none_and_keeps_cache_cold() {
        let (_, venue, cache) = setup(1000.0);
        venue.state.lock().equity_fails = true;
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, None);
        assert_eq!(cache.cached(), None);

        // Once the venue recovers, the fetch succeeds and is cached.
        venue.state.lock().equity_fails = false;
        assert_eq!(cache.equity(venue.as_ref(), "USDT").await, Some(1000.0));
        assert_eq!(cache.cached(), Some(1000.0));
    }
}
