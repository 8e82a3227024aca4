// =============================================================================
// Daily Loss Tracker — pnl accumulator with WIB-midnight reset
// =============================================================================
//
// The counter resets at the first observation on or after the next 00:00 WIB
// (UTC+7) boundary. Resets happen lazily on every update or query, so there
// is no background task to schedule.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::{next_wib_midnight, Clock};

struct Inner {
    daily_pnl: f64,
    starting_balance: f64,
    reset_at: DateTime<Utc>,
}

/// Accumulates realised pnl over the current WIB trading day.
pub struct DailyLossTracker {
    max_daily_loss: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<Inner>,
}

impl DailyLossTracker {
    /// # Arguments
    /// * `max_daily_loss` — loss fraction of starting balance that counts as
    ///   breached (e.g. 0.03 for 3 %).
    pub fn new(max_daily_loss: f64, clock: Arc<dyn Clock>) -> Self {
        let reset_at = next_wib_midnight(clock.now_utc());
        Self {
            max_daily_loss,
            clock,
            state: Mutex::new(Inner {
                daily_pnl: 0.0,
                starting_balance: 0.0,
                reset_at,
            }),
        }
    }

    /// Capture the day's starting balance the first time equity is observed.
    pub fn seed_starting_balance(&self, balance: f64) {
        let mut s = self.state.lock();
        if s.starting_balance == 0.0 && balance > 0.0 {
            s.starting_balance = balance;
            info!(balance, "daily-loss starting balance captured");
        }
    }

    /// Add realised pnl to the daily counter.
    pub fn update_pnl(&self, pnl: f64) {
        let now = self.clock.now_utc();
        let mut s = self.state.lock();
        Self::maybe_reset(&mut s, now);
        s.daily_pnl += pnl;
        debug!(pnl, daily_pnl = s.daily_pnl, "daily pnl updated");
    }

    pub fn daily_pnl(&self) -> f64 {
        let now = self.clock.now_utc();
        let mut s = self.state.lock();
        Self::maybe_reset(&mut s, now);
        s.daily_pnl
    }

    /// Daily loss as a fraction of the starting balance; gains count as 0,
    /// and an unobserved starting balance yields 0.
    pub fn loss_percentage(&self) -> f64 {
        let now = self.clock.now_utc();
        let mut s = self.state.lock();
        Self::maybe_reset(&mut s, now);
        if s.starting_balance <= 0.0 {
            return 0.0;
        }
        (-s.daily_pnl).max(0.0) / s.starting_balance
    }

    /// Whether today's loss has reached the configured limit.
    pub fn is_limit_breached(&self) -> bool {
        self.loss_percentage() >= self.max_daily_loss
    }

    /// Reset the counter and recompute the next boundary. Idempotent: a
    /// second call without time passing leaves the same reset time.
    pub fn reset_daily_counter(&self) {
        let now = self.clock.now_utc();
        let mut s = self.state.lock();
        Self::do_reset(&mut s, now);
    }

    fn maybe_reset(s: &mut Inner, now: DateTime<Utc>) {
        if now >= s.reset_at {
            info!(
                boundary = %s.reset_at,
                dropped_pnl = s.daily_pnl,
                "daily boundary crossed — resetting pnl counter"
            );
            Self::do_reset(s, now);
        }
    }

    fn do_reset(s: &mut Inner, now: DateTime<Utc>) {
        s.daily_pnl = 0.0;
        s.reset_at = next_wib_midnight(now);
    }
}

impl std::fmt::Debug for DailyLossTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.lock();
        f.debug_struct("DailyLossTracker")
            .field("max_daily_loss", &self.max_daily_loss)
            .field("daily_pnl", &s.daily_pnl)
            .field("starting_balance", &s.starting_balance)
            .field("reset_at", &s.reset_at)
            .finish()
    }
}
