// =============================================================================
// Trade Manager — signal admission, order sequence, and position-map ownership
// =============================================================================
//
// The manager exclusively owns the position map. The map mutex guards every
// read and mutation and is NEVER held across venue I/O: admission gates that
// need the network run on a snapshot taken under the lock, and the insert
// re-checks for races once the orders are placed.
//
// Admission pipeline per signal:
//   uniqueness/capacity gate → portfolio-exposure gate → breaker/daily-loss
//   gate → sizing → entry order → SL plan → TP plan → insert + journal →
//   monitor spawn → entry notification.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::balance::BalanceCache;
use crate::bitget::models::{PlanType, TpslRequest, TriggerSource};
use crate::bitget::precision::InstrumentSpec;
use crate::bitget::VenueApi;
use crate::clock::Clock;
use crate::config::ExecutionConfig;
use crate::error::{AdmissionError, VenueResult};
use crate::journal::PositionJournal;
use crate::monitor;
use crate::notifier::{Notifier, NotifyEvent};
use crate::risk::{CircuitBreaker, DailyLossTracker, PortfolioRiskTracker};
use crate::sizing;
use crate::types::{PositionRecord, Side, TradeSignal};

/// Result of an explicit close request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing was open locally or on the venue.
    AlreadyClosed,
    /// A closing market order was accepted.
    Closed { order_id: String },
}

/// Aggregate view of open risk for dashboards and operators.
#[derive(Debug, Clone)]
pub struct PositionSummary {
    pub total_positions: usize,
    pub max_concurrent_positions: usize,
    /// Σ size · entry · stop_loss_fraction over open positions.
    pub total_at_risk: f64,
    pub wallet_balance: Option<f64>,
    pub risk_percentage_of_balance: f64,
    pub circuit_breaker_active: bool,
}

/// Owns the position map, the journal, and the risk gates.
pub struct TradeManager {
    /// Self-handle for spawning monitor tasks that outlive the caller.
    self_ref: Weak<TradeManager>,
    venue: Arc<dyn VenueApi>,
    config: ExecutionConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    journal: PositionJournal,
    positions: Mutex<HashMap<String, PositionRecord>>,
    /// Cancellation flag per running monitor, keyed by symbol.
    monitors: Mutex<HashMap<String, Arc<AtomicBool>>>,
    balance: BalanceCache,
    daily_loss: DailyLossTracker,
    breaker: CircuitBreaker,
    portfolio: PortfolioRiskTracker,
}

impl TradeManager {
    pub fn new(
        venue: Arc<dyn VenueApi>,
        config: ExecutionConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        journal: PositionJournal,
    ) -> Arc<Self> {
        let daily_loss = DailyLossTracker::new(config.max_daily_loss_percentage, clock.clone());
        let breaker = CircuitBreaker::new(config.max_circuit_breaker_duration, clock.clone());
        let portfolio = PortfolioRiskTracker::new(config.max_portfolio_risk_percentage);
        let balance = BalanceCache::new(clock.clone());

        info!(
            max_concurrent_positions = config.max_concurrent_positions,
            stop_loss_percent = config.stop_loss_percent,
            risk_percentage = config.risk_percentage,
            paper_trading = config.paper_trading,
            "TradeManager initialised"
        );

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            venue,
            config,
            clock,
            notifier,
            journal,
            positions: Mutex::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            balance,
            daily_loss,
            breaker,
            portfolio,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn venue(&self) -> &Arc<dyn VenueApi> {
        &self.venue
    }

    pub fn daily_loss(&self) -> &DailyLossTracker {
        &self.daily_loss
    }

    /// Snapshot of one tracked position.
    pub fn position(&self, symbol: &str) -> Option<PositionRecord> {
        self.positions.lock().get(symbol).cloned()
    }

    pub fn open_symbols(&self) -> Vec<String> {
        self.positions.lock().keys().cloned().collect()
    }

    /// Forward an event to the notifier; delivery is fire-and-forget.
    pub fn notify(&self, event: &NotifyEvent) {
        self.notifier.emit(event);
    }

    /// Fold realised pnl into the daily-loss tracker.
    pub fn record_realized_pnl(&self, pnl: f64) {
        self.daily_loss.update_pnl(pnl);
    }

    // -------------------------------------------------------------------------
    // Signal admission
    // -------------------------------------------------------------------------

    /// Admit a signal and open a position with its protective bracket.
    ///
    /// Exactly one terminal outcome per call: the new record, or a typed
    /// rejection with no tracked side effects.
    pub async fn submit_signal(
        &self,
        signal: &TradeSignal,
    ) -> Result<PositionRecord, AdmissionError> {
        let symbol = signal.symbol.clone();
        let side = signal.side().ok_or_else(|| {
            AdmissionError::InvalidSignal(format!(
                "signal type '{}' is neither Buy nor Sell",
                signal.signal_type
            ))
        })?;

        info!(%symbol, %side, price = signal.price, "signal received");

        // Gate 1: uniqueness and capacity, under the map lock. The snapshot
        // feeds the exposure gate after the lock is released.
        let exposure_snapshot: Vec<(String, f64, f64)> = {
            let positions = self.positions.lock();
            if positions.contains_key(&symbol) {
                warn!(%symbol, "rejected: position already open");
                return Err(AdmissionError::Duplicate(symbol));
            }
            if positions.len() >= self.config.max_concurrent_positions {
                warn!(
                    %symbol,
                    open = positions.len(),
                    "rejected: position capacity reached"
                );
                return Err(AdmissionError::CapacityExceeded(
                    self.config.max_concurrent_positions,
                ));
            }
            positions
                .values()
                .map(|p| (p.symbol.clone(), p.size, p.entry_price))
                .collect()
        };

        // Gate 2: portfolio exposure against live marks.
        let equity = self
            .wallet_equity()
            .await
            .ok_or(AdmissionError::InsufficientEquity)?;
        let mut exposure = 0.0;
        for (sym, size, entry_price) in &exposure_snapshot {
            let mark = match self.venue.ticker(sym).await {
                Ok(ticker) => ticker.last,
                Err(e) => {
                    warn!(symbol = %sym, error = %e, "ticker failed — valuing at entry price");
                    *entry_price
                }
            };
            exposure += (size * mark).abs();
        }
        self.portfolio
            .check(exposure, equity)
            .map_err(AdmissionError::RiskRejected)?;

        // Gate 3: circuit breaker, then the daily-loss trip condition.
        if let Some((reason, remaining_secs)) = self.breaker.status() {
            warn!(%symbol, %reason, remaining_secs, "rejected: circuit breaker active");
            return Err(AdmissionError::CircuitOpen {
                reason,
                remaining_secs,
            });
        }
        if self.daily_loss.is_limit_breached() {
            let reason = format!(
                "daily loss {:.2}% breached limit {:.2}%",
                self.daily_loss.loss_percentage() * 100.0,
                self.config.max_daily_loss_percentage * 100.0
            );
            self.breaker.trip(reason.clone());
            return Err(AdmissionError::CircuitOpen {
                reason,
                remaining_secs: self.config.max_circuit_breaker_duration,
            });
        }

        // Sizing and bracket derivation.
        let spec = match self.venue.instrument(&symbol).await {
            Ok(spec) => spec,
            Err(e) => {
                warn!(%symbol, error = %e, "instrument lookup failed — using default precision");
                InstrumentSpec::fallback(&symbol)
            }
        };
        let plan = sizing::compute_plan(
            &spec,
            side,
            signal.price,
            Some(equity),
            self.config.risk_percentage,
            self.config.stop_loss_percent,
        )?;

        // Entry order. A failure here leaves no trace.
        let main_order_id = if self.config.paper_trading {
            self.sim_order_id(&symbol)
        } else {
            let client_oid = Uuid::new_v4().to_string();
            self.venue
                .place_market_order(&symbol, side.order_side(), plan.size, false, Some(&client_oid))
                .await
                .map_err(|e| {
                    warn!(%symbol, error = %e, "entry order rejected");
                    AdmissionError::OrderRejected(e.to_string())
                })?
        };
        info!(%symbol, order_id = %main_order_id, size = plan.size, "entry order placed");

        // Protective bracket. Failures are logged and tolerated; the monitor
        // re-attempts a venue-side stop on its trailing cycles.
        let stop_loss_order_id = self
            .place_bracket_leg(&symbol, side, PlanType::StopLoss, plan.stop_loss, plan.size)
            .await;
        let take_profit_order_id = self
            .place_bracket_leg(&symbol, side, PlanType::TakeProfit, plan.take_profit, plan.size)
            .await;

        let record = PositionRecord {
            symbol: symbol.clone(),
            side,
            size: plan.size,
            entry_price: signal.price,
            stop_loss_price: plan.stop_loss,
            take_profit_price: plan.take_profit,
            main_order_id,
            stop_loss_order_id,
            take_profit_order_id,
            opened_at: signal.timestamp.clone(),
        };

        // Insert, re-checking races that formed while the lock was released.
        {
            let mut positions = self.positions.lock();
            if positions.contains_key(&symbol) {
                warn!(%symbol, "concurrent admission won during order placement — keeping first");
                return Err(AdmissionError::Duplicate(symbol));
            }
            if positions.len() >= self.config.max_concurrent_positions {
                warn!(
                    %symbol,
                    "capacity filled during order placement — venue position needs manual reconciliation"
                );
                return Err(AdmissionError::CapacityExceeded(
                    self.config.max_concurrent_positions,
                ));
            }
            positions.insert(symbol.clone(), record.clone());
            self.persist_locked(&positions);
        }

        self.spawn_monitor(&symbol);

        self.notify(&NotifyEvent::Entry {
            symbol,
            side,
            entry_price: signal.price,
            size: plan.size,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            risk_amount: plan.risk_amount,
            equity,
        });

        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Bracket mutation
    // -------------------------------------------------------------------------

    /// Move the stop-loss and/or take-profit of a tracked position.
    ///
    /// The stop may only advance toward profit and the bracket must stay
    /// ordered; violating updates are rejected before any venue call.
    pub async fn update_bracket(
        &self,
        symbol: &str,
        new_sl: Option<f64>,
        new_tp: Option<f64>,
    ) -> Result<PositionRecord, AdmissionError> {
        let record = self
            .position(symbol)
            .ok_or_else(|| AdmissionError::UnknownPosition(symbol.to_string()))?;
        validate_bracket_update(&record, new_sl, new_tp)?;

        let mut sl_order_id = None;
        if let Some(sl) = new_sl {
            sl_order_id = Some(
                self.upsert_plan(
                    &record,
                    PlanType::StopLoss,
                    record.stop_loss_order_id.as_deref(),
                    sl,
                )
                .await?,
            );
        }
        let mut tp_order_id = None;
        if let Some(tp) = new_tp {
            tp_order_id = Some(
                self.upsert_plan(
                    &record,
                    PlanType::TakeProfit,
                    record.take_profit_order_id.as_deref(),
                    tp,
                )
                .await?,
            );
        }

        let mut positions = self.positions.lock();
        let Some(entry) = positions.get_mut(symbol) else {
            warn!(symbol, "position retired during bracket update");
            return Err(AdmissionError::UnknownPosition(symbol.to_string()));
        };
        if let Some(sl) = new_sl {
            entry.stop_loss_price = sl;
            if let Some(id) = sl_order_id {
                entry.stop_loss_order_id = Some(id);
            }
        }
        if let Some(tp) = new_tp {
            entry.take_profit_price = tp;
            if let Some(id) = tp_order_id {
                entry.take_profit_order_id = Some(id);
            }
        }
        let updated = entry.clone();
        self.persist_locked(&positions);
        drop(positions);

        debug!(
            symbol,
            stop_loss = updated.stop_loss_price,
            take_profit = updated.take_profit_price,
            "bracket updated"
        );
        Ok(updated)
    }

    /// Modify an existing plan order, or place a fresh one when the leg has
    /// no venue order yet. Returns the order id to adopt.
    async fn upsert_plan(
        &self,
        record: &PositionRecord,
        plan: PlanType,
        existing_id: Option<&str>,
        trigger_price: f64,
    ) -> Result<String, AdmissionError> {
        if self.config.paper_trading {
            return Ok(existing_id
                .map(str::to_string)
                .unwrap_or_else(|| self.sim_order_id(&record.symbol)));
        }

        let result = match existing_id {
            Some(id) => {
                self.venue
                    .modify_tpsl(id, &record.symbol, trigger_price, None, None)
                    .await
            }
            None => {
                self.venue
                    .place_tpsl(&TpslRequest {
                        symbol: record.symbol.clone(),
                        plan,
                        trigger_price,
                        execute_price: None,
                        hold_side: record.side,
                        size: record.size,
                        trigger_source: TriggerSource::Last,
                    })
                    .await
            }
        };
        result.map_err(|e| AdmissionError::OrderRejected(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Close a position with a reduce-only market order, sized from venue
    /// truth. An already-flat position (locally and on the venue) is success.
    pub async fn close_position(&self, symbol: &str) -> VenueResult<CloseOutcome> {
        let local = self.position(symbol);

        if self.config.paper_trading {
            return Ok(match self.retire_position(symbol) {
                Some(_) => CloseOutcome::Closed {
                    order_id: self.sim_order_id(symbol),
                },
                None => CloseOutcome::AlreadyClosed,
            });
        }

        // Prefer the venue's view of size and direction; fall back to the
        // local record when the venue cannot answer.
        let (size, close_side) = match self.venue.positions(Some(symbol)).await {
            Ok(list) => match list.iter().find(|p| p.symbol == symbol && p.size() != 0.0) {
                Some(live) => {
                    let close_side = if live.side() == Some(Side::Short) {
                        "buy"
                    } else {
                        "sell"
                    };
                    (live.size().abs(), close_side)
                }
                None => {
                    if self.retire_position(symbol).is_some() {
                        info!(symbol, "venue already flat — local record retired");
                    }
                    return Ok(CloseOutcome::AlreadyClosed);
                }
            },
            Err(e) => match &local {
                Some(record) => {
                    warn!(symbol, error = %e, "venue lookup failed — closing from local record");
                    (record.size, record.side.closing_order_side())
                }
                None => return Err(e),
            },
        };

        self.cancel_bracket(symbol, local.as_ref()).await;

        let order_id = self
            .venue
            .place_market_order(symbol, close_side, size, true, None)
            .await?;
        self.retire_position(symbol);
        info!(symbol, order_id = %order_id, size, "position closed by market order");
        Ok(CloseOutcome::Closed { order_id })
    }

    /// Best-effort cancellation of the protective bracket: known plan ids
    /// first, then a sweep of whatever is still pending for the symbol.
    async fn cancel_bracket(&self, symbol: &str, record: Option<&PositionRecord>) {
        let mut known: Vec<(String, PlanType)> = Vec::new();
        if let Some(rec) = record {
            if let Some(id) = &rec.stop_loss_order_id {
                known.push((id.clone(), PlanType::StopLoss));
            }
            if let Some(id) = &rec.take_profit_order_id {
                known.push((id.clone(), PlanType::TakeProfit));
            }
        }
        for (id, plan) in &known {
            if id.starts_with("SIM_") {
                continue;
            }
            if let Err(e) = self.venue.cancel_tpsl(id, symbol, *plan).await {
                debug!(symbol, order_id = %id, error = %e, "plan cancel failed (may already be gone)");
            }
        }

        match self.venue.pending_plans(symbol).await {
            Ok(plans) => {
                for pending in plans {
                    let Some(id) = pending.order_id else { continue };
                    if known.iter().any(|(k, _)| *k == id) {
                        continue;
                    }
                    let plan = match pending.plan_type.as_deref() {
                        Some("profit_plan") => PlanType::TakeProfit,
                        Some("moving_plan") => PlanType::Trailing,
                        _ => PlanType::StopLoss,
                    };
                    if let Err(e) = self.venue.cancel_tpsl(&id, symbol, plan).await {
                        debug!(symbol, order_id = %id, error = %e, "pending plan cancel failed");
                    }
                }
            }
            Err(e) => debug!(symbol, error = %e, "pending-plan sweep failed"),
        }
    }

    // -------------------------------------------------------------------------
    // Retirement & recovery
    // -------------------------------------------------------------------------

    /// Remove a record from the map, persist, and cancel its monitor.
    /// Returns the removed record; `None` means another path won the race.
    pub fn retire_position(&self, symbol: &str) -> Option<PositionRecord> {
        let removed = {
            let mut positions = self.positions.lock();
            let removed = positions.remove(symbol);
            if removed.is_some() {
                self.persist_locked(&positions);
            }
            removed
        };
        if removed.is_some() {
            if let Some(flag) = self.monitors.lock().remove(symbol) {
                flag.store(true, Ordering::Relaxed);
            }
            info!(symbol, "position retired from tracking");
        }
        removed
    }

    /// Load the journal and resume a monitor per persisted position. Each
    /// monitor reconciles its record against the venue on the first poll.
    pub fn resume_from_journal(&self) -> anyhow::Result<usize> {
        let loaded = self.journal.load()?;
        if loaded.is_empty() {
            return Ok(0);
        }
        let count = loaded.len();
        {
            let mut positions = self.positions.lock();
            positions.extend(loaded);
        }
        let symbols = self.open_symbols();
        info!(count, symbols = ?symbols, "resuming monitors for persisted positions");
        for symbol in &symbols {
            self.spawn_monitor(symbol);
        }
        Ok(count)
    }

    /// Cancel all monitors and persist the final map.
    pub fn shutdown(&self) {
        info!("shutting down — cancelling monitors and persisting journal");
        for flag in self.monitors.lock().values() {
            flag.store(true, Ordering::Relaxed);
        }
        let positions = self.positions.lock();
        self.persist_locked(&positions);
    }

    // -------------------------------------------------------------------------
    // Summary
    // -------------------------------------------------------------------------

    /// Open-risk overview across all tracked positions.
    pub async fn position_summary(&self) -> PositionSummary {
        let snapshot: Vec<PositionRecord> = self.positions.lock().values().cloned().collect();
        let total_at_risk: f64 = snapshot
            .iter()
            .map(|p| (p.size * p.entry_price * self.config.stop_loss_percent).abs())
            .sum();
        let wallet_balance = self.wallet_equity().await;
        let risk_percentage_of_balance = match wallet_balance {
            Some(balance) if balance > 0.0 => total_at_risk / balance * 100.0,
            _ => 0.0,
        };
        PositionSummary {
            total_positions: snapshot.len(),
            max_concurrent_positions: self.config.max_concurrent_positions,
            total_at_risk,
            wallet_balance,
            risk_percentage_of_balance,
            circuit_breaker_active: self.breaker.is_active(),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Cached-or-fetched account equity; the first observation of the day
    /// seeds the daily-loss starting balance.
    async fn wallet_equity(&self) -> Option<f64> {
        let equity = self.balance.equity(self.venue.as_ref(), "USDT").await?;
        self.daily_loss.seed_starting_balance(equity);
        Some(equity)
    }

    fn sim_order_id(&self, symbol: &str) -> String {
        format!("SIM_{}_{symbol}", self.clock.epoch_millis())
    }

    async fn place_bracket_leg(
        &self,
        symbol: &str,
        side: Side,
        plan: PlanType,
        trigger_price: f64,
        size: f64,
    ) -> Option<String> {
        if self.config.paper_trading {
            return Some(self.sim_order_id(symbol));
        }
        let req = TpslRequest {
            symbol: symbol.to_string(),
            plan,
            trigger_price,
            execute_price: None,
            hold_side: side,
            size,
            trigger_source: TriggerSource::Last,
        };
        match self.venue.place_tpsl(&req).await {
            Ok(id) => {
                info!(symbol, plan = plan.as_str(), trigger_price, order_id = %id, "plan order placed");
                Some(id)
            }
            Err(e) => {
                warn!(
                    symbol,
                    plan = plan.as_str(),
                    error = %e,
                    "plan order failed — position tracked without it"
                );
                None
            }
        }
    }

    fn spawn_monitor(&self, symbol: &str) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let cancel = Arc::new(AtomicBool::new(false));
        self.monitors
            .lock()
            .insert(symbol.to_string(), cancel.clone());
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            monitor::run_position_monitor(manager, symbol, cancel).await;
        });
    }

    /// Write the journal while the caller still holds the map lock, so no
    /// admission can observe a map the journal does not yet reflect.
    fn persist_locked(&self, positions: &HashMap<String, PositionRecord>) {
        if let Err(e) = self.journal.save(positions) {
            error!(error = %e, "journal write failed — in-memory state retained");
        }
    }
}

/// Reject bracket updates that would regress the stop (the stop only moves
/// toward profit) or break the bracket's ordering for the position's side.
fn validate_bracket_update(
    record: &PositionRecord,
    new_sl: Option<f64>,
    new_tp: Option<f64>,
) -> Result<(), AdmissionError> {
    let effective_sl = new_sl.unwrap_or(record.stop_loss_price);
    let effective_tp = new_tp.unwrap_or(record.take_profit_price);

    match record.side {
        Side::Long => {
            if let Some(sl) = new_sl {
                if sl <= record.stop_loss_price {
                    return Err(AdmissionError::InvalidBracket(format!(
                        "stop loss may only move up for a long ({} -> {sl})",
                        record.stop_loss_price
                    )));
                }
            }
            if let Some(tp) = new_tp {
                if tp <= record.entry_price {
                    return Err(AdmissionError::InvalidBracket(format!(
                        "take profit must sit above the entry for a long ({} -> {tp})",
                        record.entry_price
                    )));
                }
            }
            if effective_sl >= effective_tp {
                return Err(AdmissionError::InvalidBracket(format!(
                    "stop loss {effective_sl} must stay below take profit {effective_tp}"
                )));
            }
        }
        Side::Short => {
            if let Some(sl) = new_sl {
                if sl >= record.stop_loss_price {
                    return Err(AdmissionError::InvalidBracket(format!(
                        "stop loss may only move down for a short ({} -> {sl})",
                        record.stop_loss_price
                    )));
                }
            }
            if let Some(tp) = new_tp {
                if tp >= record.entry_price {
                    return Err(AdmissionError::InvalidBracket(format!(
                        "take profit must sit below the entry for a short ({} -> {tp})",
                        record.entry_price
                    )));
                }
            }
            if effective_sl <= effective_tp {
                return Err(AdmissionError::InvalidBracket(format!(
                    "stop loss {effective_sl} must stay above take profit {effective_tp}"
                )));
            }
        }
    }
    Ok(())
}

impl std::fmt::Debug for TradeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeManager")
            .field("open_positions", &self.positions.lock().len())
            .field("paper_trading", &self.config.paper_trading)
            .field("breaker", &self.breaker)
            .finish()
    }
}
