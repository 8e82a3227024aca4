// =============================================================================
// Position Monitor — per-symbol poll loop: closure detection + trailing stop
// =============================================================================
//
// One monitor task per open symbol, spawned by the trade manager. Each cycle
// polls the venue; a zero-size answer retires the record (classifying the
// closure from recent history), otherwise the trailing-stop rule may advance
// the protective stop. Sleeps run in short slices so cancellation is seen
// within five seconds; transient errors back off and never kill the loop.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::error::VenueError;
use crate::manager::TradeManager;
use crate::notifier::{CloseReason, NotifyEvent};
use crate::types::{PositionRecord, Side};

/// Seconds between venue polls.
const MONITOR_INTERVAL_SECS: u64 = 30;
/// Cancellation granularity of the main sleep.
const SLICE_SECS: u64 = 5;
/// Backoff after a failed cycle.
const ERROR_BACKOFF_SECS: u64 = 10;
/// Cancellation granularity of the error backoff.
const ERROR_SLICE_SECS: u64 = 2;

/// A long's stop trails only once price clears the stop by 0.5 %.
const LONG_ARM_RATIO: f64 = 1.005;
/// Mirror threshold for shorts.
const SHORT_ARM_RATIO: f64 = 0.995;
/// The trailed stop sits at 60 % of the configured stop distance.
const TRAIL_DISTANCE_FACTOR: f64 = 0.6;

#[derive(Debug)]
enum CycleOutcome {
    Retired,
    KeepWatching,
}

/// Run the monitor loop for one symbol until the position retires or the
/// cancellation flag is raised.
pub async fn run_position_monitor(
    manager: Arc<TradeManager>,
    symbol: String,
    cancel: Arc<AtomicBool>,
) {
    info!(%symbol, "position monitor started");

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!(%symbol, "monitor cancelled");
            break;
        }
        let Some(record) = manager.position(&symbol) else {
            debug!(%symbol, "position no longer tracked — monitor exiting");
            break;
        };

        match monitor_cycle(&manager, &record).await {
            Ok(CycleOutcome::Retired) => break,
            Ok(CycleOutcome::KeepWatching) => {
                if sliced_sleep(MONITOR_INTERVAL_SECS, SLICE_SECS, &cancel).await {
                    break;
                }
            }
            Err(e) => {
                warn!(%symbol, error = %e, "monitor cycle failed — backing off");
                if sliced_sleep(ERROR_BACKOFF_SECS, ERROR_SLICE_SECS, &cancel).await {
                    break;
                }
            }
        }
    }

    info!(%symbol, "position monitor stopped");
}

/// One poll: detect venue-side closure, otherwise evaluate the trailing stop.
async fn monitor_cycle(
    manager: &TradeManager,
    record: &PositionRecord,
) -> Result<CycleOutcome, VenueError> {
    let positions = manager.venue().positions(Some(&record.symbol)).await?;
    let live = positions.iter().find(|p| p.symbol == record.symbol);
    let size = live.map(|p| p.size()).unwrap_or(0.0);

    if size == 0.0 {
        retire(manager, record).await;
        return Ok(CycleOutcome::Retired);
    }

    if let Some(live) = live {
        debug!(
            symbol = %record.symbol,
            size,
            open_price = live.open_price(),
            unrealized_pnl = live.unrealized_pnl(),
            "position still open"
        );
    }

    evaluate_trailing(manager, record).await;
    Ok(CycleOutcome::KeepWatching)
}

/// Venue reports the position gone: remove it locally, classify why it
/// closed, feed realised pnl to the daily tracker, and notify.
async fn retire(manager: &TradeManager, record: &PositionRecord) {
    // A concurrent explicit close may have removed it already; that path
    // owns the bookkeeping then.
    let Some(rec) = manager.retire_position(&record.symbol) else {
        return;
    };

    let (reason, realized_pnl, exit_price) = classify_closure(manager, &rec).await;
    if let Some(pnl) = realized_pnl {
        manager.record_realized_pnl(pnl);
    }

    let pnl_percent = match realized_pnl {
        Some(pnl) if rec.entry_price > 0.0 && rec.size > 0.0 => {
            pnl / (rec.entry_price * rec.size) * 100.0
        }
        _ if rec.entry_price > 0.0 => {
            rec.side.direction() * (exit_price - rec.entry_price) / rec.entry_price * 100.0
        }
        _ => 0.0,
    };

    info!(
        symbol = %rec.symbol,
        %reason,
        exit_price,
        pnl = realized_pnl,
        "position closed on venue — retired"
    );

    manager.notify(&NotifyEvent::Closed {
        symbol: rec.symbol.clone(),
        side: rec.side,
        entry_price: rec.entry_price,
        exit_price,
        size: rec.size,
        pnl_percent,
        reason,
    });
}

/// Closure reason from recent history (pnl sign), falling back to comparing
/// the last price against the stored bracket.
async fn classify_closure(
    manager: &TradeManager,
    record: &PositionRecord,
) -> (CloseReason, Option<f64>, f64) {
    match manager
        .venue()
        .history_positions(Some(&record.symbol), 20)
        .await
    {
        Ok(history) => {
            if let Some(closed) = history.iter().find(|h| h.symbol == record.symbol) {
                if let Some(pnl) = closed.realized_pnl() {
                    let reason = if pnl < 0.0 {
                        CloseReason::StopLoss
                    } else if pnl > 0.0 {
                        CloseReason::TakeProfit
                    } else {
                        CloseReason::Manual
                    };
                    let exit = closed.close_price().unwrap_or(record.entry_price);
                    return (reason, Some(pnl), exit);
                }
            }
            infer_from_price(manager, record).await
        }
        Err(e) => {
            debug!(symbol = %record.symbol, error = %e, "history lookup failed — inferring from price");
            infer_from_price(manager, record).await
        }
    }
}

async fn infer_from_price(
    manager: &TradeManager,
    record: &PositionRecord,
) -> (CloseReason, Option<f64>, f64) {
    match manager.venue().ticker(&record.symbol).await {
        Ok(ticker) => {
            let last = ticker.last;
            let reason = match record.side {
                Side::Long => {
                    if last <= record.stop_loss_price {
                        CloseReason::StopLoss
                    } else if last >= record.take_profit_price {
                        CloseReason::TakeProfit
                    } else {
                        CloseReason::Manual
                    }
                }
                Side::Short => {
                    if last >= record.stop_loss_price {
                        CloseReason::StopLoss
                    } else if last <= record.take_profit_price {
                        CloseReason::TakeProfit
                    } else {
                        CloseReason::Manual
                    }
                }
            };
            (reason, None, last)
        }
        Err(_) => (CloseReason::Manual, None, record.entry_price),
    }
}

/// Advance the stop toward profit when price has moved enough. The stop
/// never regresses; `update_bracket` enforces that again at commit time.
async fn evaluate_trailing(manager: &TradeManager, record: &PositionRecord) {
    let ticker = match manager.venue().ticker(&record.symbol).await {
        Ok(ticker) => ticker,
        Err(e) => {
            warn!(symbol = %record.symbol, error = %e, "ticker unavailable — skipping trailing check");
            return;
        }
    };

    let last = ticker.last;
    let stop_fraction = manager.config().stop_loss_percent;
    let cur_sl = record.stop_loss_price;

    let candidate = match record.side {
        Side::Long if last > record.entry_price && last > cur_sl * LONG_ARM_RATIO => {
            let new_sl = last * (1.0 - TRAIL_DISTANCE_FACTOR * stop_fraction);
            (new_sl > cur_sl).then_some(new_sl)
        }
        Side::Short if last < record.entry_price && last < cur_sl * SHORT_ARM_RATIO => {
            let new_sl = last * (1.0 + TRAIL_DISTANCE_FACTOR * stop_fraction);
            (new_sl < cur_sl).then_some(new_sl)
        }
        _ => None,
    };

    let Some(new_sl) = candidate else { return };

    info!(
        symbol = %record.symbol,
        last,
        old_sl = cur_sl,
        new_sl,
        "advancing trailing stop"
    );
    match manager.update_bracket(&record.symbol, Some(new_sl), None).await {
        Ok(_) => debug!(symbol = %record.symbol, new_sl, "trailing stop committed"),
        Err(e) => warn!(symbol = %record.symbol, error = %e, "trailing stop update failed"),
    }
}

/// Sleep `total_secs` in `slice_secs` chunks, returning `true` as soon as
/// the cancellation flag is observed.
async fn sliced_sleep(total_secs: u64, slice_secs: u64, cancel: &AtomicBool) -> bool {
    let mut remaining = total_secs;
    while remaining > 0 {
        if cancel.load(Ordering::Relaxed) {
            return true;
        }
        let step = remaining.min(slice_secs);
        tokio::time::sleep(Duration::from_secs(step)).await;
        remaining -= step;
    }
    cancel.load(Ordering::Relaxed)
}
