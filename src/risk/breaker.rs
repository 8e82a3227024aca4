// =============================================================================
// Circuit Breaker — blocks admissions for a bounded time after a trip
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;

struct Trip {
    reason: String,
    until: DateTime<Utc>,
}

/// Risk switch with timed auto-reset. Inactive by default.
pub struct CircuitBreaker {
    duration_secs: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<Trip>>,
}

impl CircuitBreaker {
    pub fn new(duration_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            duration_secs,
            clock,
            state: Mutex::new(None),
        }
    }

    /// Trip the breaker; admissions are blocked until `now + duration`.
    pub fn trip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let until = self.clock.now_utc() + Duration::seconds(self.duration_secs as i64);
        warn!(%reason, %until, "circuit breaker tripped");
        *self.state.lock() = Some(Trip { reason, until });
    }

    /// Trip reason and remaining seconds while active. An expired trip is
    /// auto-deactivated here before the answer is produced.
    pub fn status(&self) -> Option<(String, u64)> {
        let now = self.clock.now_utc();
        let mut state = self.state.lock();
        match state.as_ref() {
            Some(trip) if now < trip.until => {
                let remaining = (trip.until - now).num_seconds().max(0) as u64;
                Some((trip.reason.clone(), remaining))
            }
            Some(_) => {
                info!("circuit breaker timer expired — auto-reset");
                *state = None;
                None
            }
            None => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status().is_some()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("duration_secs", &self.duration_secs)
            .field("active", &state.is_some())
            .finish()
    }
}
