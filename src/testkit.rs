// =============================================================================
// Test support — scripted in-memory venue, recording notifier, rig builder
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::bitget::models::{
    ClosedPosition, PlanOrderInfo, PlanType, Ticker, TpslRequest, VenuePosition,
};
use crate::bitget::precision::InstrumentSpec;
use crate::bitget::VenueApi;
use crate::clock::ManualClock;
use crate::config::ExecutionConfig;
use crate::error::{TransportKind, VenueError, VenueResult};
use crate::journal::PositionJournal;
use crate::manager::TradeManager;
use crate::notifier::{Notifier, NotifyEvent};
use crate::types::TradeSignal;

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: String,
    pub size: f64,
    pub reduce_only: bool,
}

#[derive(Debug, Clone)]
pub struct PlacedPlan {
    pub symbol: String,
    pub plan: PlanType,
    pub trigger_price: f64,
    pub size: f64,
}

/// Scripted state behind the mock venue; tests poke it directly.
#[derive(Default)]
pub struct MockState {
    pub equity: f64,
    pub equity_fails: bool,
    pub equity_calls: u32,
    pub tickers: HashMap<String, f64>,
    pub specs: HashMap<String, InstrumentSpec>,
    pub venue_positions: Vec<VenuePosition>,
    pub positions_fail: bool,
    pub history: Vec<ClosedPosition>,
    pub history_fails: bool,
    pub market_orders: Vec<PlacedOrder>,
    pub plan_orders: Vec<PlacedPlan>,
    pub plan_modifications: Vec<(String, f64)>,
    pub plan_cancellations: Vec<String>,
    pub pending: Vec<PlanOrderInfo>,
    pub next_order_id: u64,
    /// Widens race windows in concurrency tests.
    pub entry_delay_ms: u64,
    /// Mirror fills into `venue_positions` so monitors see live positions.
    pub track_positions_on_fill: bool,
    pub fail_market_orders: bool,
    pub fail_plan_orders: bool,
}

pub struct MockVenue {
    pub state: Mutex<MockState>,
}

impl MockVenue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_order_id: 1,
                track_positions_on_fill: true,
                ..Default::default()
            }),
        }
    }

    fn next_id(state: &mut MockState) -> String {
        let id = state.next_order_id;
        state.next_order_id += 1;
        format!("order-{id}")
    }

    fn transport(message: &str) -> VenueError {
        VenueError::Transport {
            kind: TransportKind::Timeout,
            message: message.into(),
        }
    }
}

#[async_trait]
impl VenueApi for MockVenue {
    async fn list_instruments(&self) -> VenueResult<Vec<InstrumentSpec>> {
        Ok(self.state.lock().specs.values().cloned().collect())
    }

    async fn instrument(&self, symbol: &str) -> VenueResult<InstrumentSpec> {
        Ok(self
            .state
            .lock()
            .specs
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| liberal_spec(symbol)))
    }

    async fn ticker(&self, symbol: &str) -> VenueResult<Ticker> {
        self.state
            .lock()
            .tickers
            .get(symbol)
            .map(|last| Ticker {
                last: *last,
                open_utc: None,
            })
            .ok_or_else(|| VenueError::Business {
                code: "40309".into(),
                message: format!("no ticker for {symbol}"),
            })
    }

    async fn account_equity(&self, _margin_coin: &str) -> VenueResult<f64> {
        let mut state = self.state.lock();
        state.equity_calls += 1;
        if state.equity_fails {
            return Err(Self::transport("equity fetch failed"));
        }
        Ok(state.equity)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        size: f64,
        reduce_only: bool,
        _client_oid: Option<&str>,
    ) -> VenueResult<String> {
        let delay = self.state.lock().entry_delay_ms;
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let mut state = self.state.lock();
        if state.fail_market_orders {
            return Err(VenueError::Business {
                code: "40757".into(),
                message: "order rejected".into(),
            });
        }
        state.market_orders.push(PlacedOrder {
            symbol: symbol.into(),
            side: side.into(),
            size,
            reduce_only,
        });
        if state.track_positions_on_fill {
            if reduce_only {
                state.venue_positions.retain(|p| p.symbol != symbol);
            } else {
                let hold = if side == "buy" { "long" } else { "short" };
                let pos = make_venue_position(symbol, hold, size);
                state.venue_positions.push(pos);
            }
        }
        Ok(Self::next_id(&mut state))
    }

    async fn place_tpsl(&self, req: &TpslRequest) -> VenueResult<String> {
        let mut state = self.state.lock();
        if state.fail_plan_orders {
            return Err(VenueError::Business {
                code: "40786".into(),
                message: "plan rejected".into(),
            });
        }
        state.plan_orders.push(PlacedPlan {
            symbol: req.symbol.clone(),
            plan: req.plan,
            trigger_price: req.trigger_price,
            size: req.size,
        });
        Ok(Self::next_id(&mut state))
    }

    async fn modify_tpsl(
        &self,
        order_id: &str,
        _symbol: &str,
        new_trigger_price: f64,
        _new_execute_price: Option<f64>,
        _new_size: Option<f64>,
    ) -> VenueResult<String> {
        let mut state = self.state.lock();
        if state.fail_plan_orders {
            return Err(VenueError::Business {
                code: "40786".into(),
                message: "modify rejected".into(),
            });
        }
        state
            .plan_modifications
            .push((order_id.into(), new_trigger_price));
        Ok(order_id.into())
    }

    async fn cancel_tpsl(
        &self,
        order_id: &str,
        _symbol: &str,
        _plan: PlanType,
    ) -> VenueResult<()> {
        self.state.lock().plan_cancellations.push(order_id.into());
        Ok(())
    }

    async fn pending_plans(&self, _symbol: &str) -> VenueResult<Vec<PlanOrderInfo>> {
        Ok(self.state.lock().pending.clone())
    }

    async fn positions(&self, symbol: Option<&str>) -> VenueResult<Vec<VenuePosition>> {
        let state = self.state.lock();
        if state.positions_fail {
            return Err(Self::transport("positions unavailable"));
        }
        Ok(state
            .venue_positions
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn history_positions(
        &self,
        symbol: Option<&str>,
        _limit: u32,
    ) -> VenueResult<Vec<ClosedPosition>> {
        let state = self.state.lock();
        if state.history_fails {
            return Err(Self::transport("history unavailable"));
        }
        Ok(state
            .history
            .iter()
            .filter(|h| symbol.map_or(true, |s| h.symbol == s))
            .cloned()
            .collect())
    }
}

/// Permissive precision rules for symbols a test did not script.
pub fn liberal_spec(symbol: &str) -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol.into(),
        price_decimals: 4,
        size_decimals: 4,
        min_size: 0.0,
        max_size: f64::INFINITY,
        step_size: 0.0001,
    }
}

/// Realistic BTCUSDT precision rules.
pub fn btc_spec() -> InstrumentSpec {
    InstrumentSpec {
        symbol: "BTCUSDT".into(),
        price_decimals: 1,
        size_decimals: 4,
        min_size: 0.001,
        max_size: 1000.0,
        step_size: 0.001,
    }
}

pub fn make_venue_position(symbol: &str, hold_side: &str, total: f64) -> VenuePosition {
    VenuePosition {
        symbol: symbol.into(),
        hold_side: hold_side.into(),
        total: Some(Value::String(format!("{total}"))),
        ..Default::default()
    }
}

pub fn make_closed_position(
    symbol: &str,
    net_profit: f64,
    close_price: Option<f64>,
) -> ClosedPosition {
    ClosedPosition {
        symbol: symbol.into(),
        close_avg_price: close_price.map(|p| Value::String(format!("{p}"))),
        net_profit: Some(Value::String(format!("{net_profit}"))),
        pnl: None,
    }
}

/// Captures emitted events for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotifyEvent>>,
}

impl Notifier for RecordingNotifier {
    fn emit(&self, event: &NotifyEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn signal(symbol: &str, signal_type: &str, price: f64) -> TradeSignal {
    TradeSignal {
        symbol: symbol.into(),
        signal_type: signal_type.into(),
        price,
        timestamp: "t0".into(),
    }
}

pub fn test_config(max_positions: usize) -> ExecutionConfig {
    ExecutionConfig {
        max_concurrent_positions: max_positions,
        stop_loss_percent: 0.02,
        risk_percentage: 0.01,
        use_dynamic_risk: false,
        // Wide enough that only the dedicated exposure tests trip it.
        max_portfolio_risk_percentage: 1.0,
        max_daily_loss_percentage: 0.03,
        max_circuit_breaker_duration: 3600,
        paper_trading: false,
    }
}

/// Everything a manager/monitor test needs, wired over the mock venue.
pub struct TestRig {
    pub manager: Arc<TradeManager>,
    pub venue: Arc<MockVenue>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub journal: PositionJournal,
}

pub async fn test_manager(config: ExecutionConfig) -> TestRig {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    ));
    let venue = Arc::new(MockVenue::new());
    venue.state.lock().equity = 1000.0;
    let notifier = Arc::new(RecordingNotifier::default());
    let journal = PositionJournal::new(
        std::env::temp_dir().join(format!("zenith_rig_{}.json", uuid::Uuid::new_v4())),
    );
    let manager = TradeManager::new(
        venue.clone(),
        config,
        clock.clone(),
        notifier.clone(),
        journal.clone(),
    );
    TestRig {
        manager,
        venue,
        clock,
        notifier,
        journal,
    }
}
