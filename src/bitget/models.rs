// =============================================================================
// Venue payload models — typed records over Bitget's mixed string/number JSON
// =============================================================================
//
// Bitget serialises most numerics as strings and occasionally as numbers, and
// omits fields freely. Every raw model therefore carries optional fields plus
// a normalising accessor; callers never probe JSON by hand.
// =============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::bitget::precision::InstrumentSpec;
use crate::types::Side;

/// Parse a JSON value that may be a string or a number into `f64`.
pub(crate) fn value_to_f64(val: &Value) -> Option<f64> {
    match val {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// One entry of `/api/v2/mix/market/contracts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub symbol: String,
    #[serde(default)]
    pub price_place: Option<String>,
    #[serde(default)]
    pub volume_place: Option<String>,
    #[serde(default)]
    pub min_trade_num: Option<String>,
    #[serde(default)]
    pub max_market_order_qty: Option<String>,
    #[serde(default)]
    pub size_multiplier: Option<String>,
}

impl RawContract {
    /// Convert to precision rules, falling back per-field to the defaults
    /// for anything the venue left out or sent unparseable.
    pub fn into_spec(self) -> InstrumentSpec {
        let fallback = InstrumentSpec::fallback(&self.symbol);
        let parse_u32 = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<u32>().ok());
        let parse_f64 = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<f64>().ok());

        InstrumentSpec {
            price_decimals: parse_u32(&self.price_place).unwrap_or(fallback.price_decimals),
            size_decimals: parse_u32(&self.volume_place).unwrap_or(fallback.size_decimals),
            min_size: parse_f64(&self.min_trade_num).unwrap_or(fallback.min_size),
            max_size: parse_f64(&self.max_market_order_qty).unwrap_or(fallback.max_size),
            step_size: parse_f64(&self.size_multiplier).unwrap_or(fallback.step_size),
            symbol: self.symbol,
        }
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// One entry of the ticker response list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    #[serde(default)]
    pub last_pr: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
    #[serde(default)]
    pub open_utc: Option<String>,
}

/// Normalised ticker: `last` is mandatory, `open_utc` is the daily UTC open.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub last: f64,
    pub open_utc: Option<f64>,
}

impl RawTicker {
    pub fn normalize(&self) -> Option<Ticker> {
        let last = self
            .last_pr
            .as_deref()
            .or(self.last.as_deref())
            .and_then(|s| s.parse().ok())?;
        let open_utc = self.open_utc.as_deref().and_then(|s| s.parse().ok());
        Some(Ticker { last, open_utc })
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One entry of `/api/v2/mix/account/accounts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    #[serde(default)]
    pub margin_coin: Option<String>,
    #[serde(default)]
    pub account_equity: Option<Value>,
}

impl RawAccount {
    pub fn equity(&self) -> f64 {
        self.account_equity
            .as_ref()
            .and_then(value_to_f64)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// One venue-position snapshot from `/api/v2/mix/position/all-position`.
///
/// The size lives in one of several fields depending on position state;
/// `size()` applies the documented probe order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePosition {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub hold_side: String,
    #[serde(default)]
    pub total: Option<Value>,
    #[serde(default)]
    pub available: Option<Value>,
    #[serde(default)]
    pub open_delegate_size: Option<Value>,
    #[serde(default)]
    pub open_price_avg: Option<Value>,
    #[serde(default, rename = "unrealizedPL")]
    pub unrealized_pl: Option<Value>,
}

impl VenuePosition {
    /// Normalised position size: first non-null, non-zero value among
    /// `total`, `available`, `openDelegateSize`; parse failures count as 0.
    pub fn size(&self) -> f64 {
        for field in [&self.total, &self.available, &self.open_delegate_size] {
            if let Some(val) = field {
                let parsed = value_to_f64(val).unwrap_or(0.0);
                if parsed != 0.0 {
                    return parsed;
                }
            }
        }
        0.0
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_hold_side(&self.hold_side)
    }

    pub fn open_price(&self) -> Option<f64> {
        self.open_price_avg.as_ref().and_then(value_to_f64)
    }

    pub fn unrealized_pnl(&self) -> Option<f64> {
        self.unrealized_pl.as_ref().and_then(value_to_f64)
    }
}

/// One closed-position record from `/api/v2/mix/position/history-position`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub close_avg_price: Option<Value>,
    #[serde(default)]
    pub net_profit: Option<Value>,
    #[serde(default)]
    pub pnl: Option<Value>,
}

impl ClosedPosition {
    /// Realised pnl, preferring the fee-inclusive `netProfit`.
    pub fn realized_pnl(&self) -> Option<f64> {
        self.net_profit
            .as_ref()
            .and_then(value_to_f64)
            .or_else(|| self.pnl.as_ref().and_then(value_to_f64))
    }

    pub fn close_price(&self) -> Option<f64> {
        self.close_avg_price.as_ref().and_then(value_to_f64)
    }
}

/// `history-position` wraps its records in a `list` field.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryData {
    #[serde(default)]
    pub list: Vec<ClosedPosition>,
}

/// `orders-plan-pending` wraps pending plan orders in `entrustedList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPlansData {
    #[serde(default)]
    pub entrusted_list: Option<Vec<PlanOrderInfo>>,
}

/// A pending plan (conditional) order on the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOrderInfo {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
}

/// Ack payload of the order-placement endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default)]
    pub order_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Plan-order request vocabulary
// ---------------------------------------------------------------------------

/// Venue plan-order class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanType {
    StopLoss,
    TakeProfit,
    Trailing,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "loss_plan",
            Self::TakeProfit => "profit_plan",
            Self::Trailing => "moving_plan",
        }
    }
}

/// Which price feed arms the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Mark,
    Last,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mark => "mark_price",
            Self::Last => "market_price",
        }
    }
}

/// Parameters of a TPSL plan-order placement.
#[derive(Debug, Clone)]
pub struct TpslRequest {
    pub symbol: String,
    pub plan: PlanType,
    pub trigger_price: f64,
    /// `None` executes at market when triggered.
    pub execute_price: Option<f64>,
    pub hold_side: Side,
    pub size: f64,
    pub trigger_source: TriggerSource,
}
