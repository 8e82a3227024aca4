// =============================================================================
// Bitget venue integration
// =============================================================================
//
// All venue I/O goes through the `VenueApi` trait so the trade manager and
// monitors depend on the interface, not the concrete HTTP client.
// =============================================================================

pub mod client;
pub mod models;
pub mod precision;

pub use client::BitgetClient;

use async_trait::async_trait;

use crate::bitget::models::{
    ClosedPosition, PlanOrderInfo, PlanType, Ticker, TpslRequest, VenuePosition,
};
use crate::bitget::precision::InstrumentSpec;
use crate::error::VenueResult;

/// The venue operations the engine consumes. Every call returns a typed
/// payload or a typed error; there are no partial results.
#[async_trait]
pub trait VenueApi: Send + Sync {
    /// Precision rules for every USDT-perp instrument.
    async fn list_instruments(&self) -> VenueResult<Vec<InstrumentSpec>>;

    /// Precision rules for one instrument, `NotFound` if unknown.
    async fn instrument(&self, symbol: &str) -> VenueResult<InstrumentSpec>;

    /// Last price and daily UTC open; `last` is mandatory.
    async fn ticker(&self, symbol: &str) -> VenueResult<Ticker>;

    /// Account equity for the margin coin; 0.0 if no matching sub-account.
    async fn account_equity(&self, margin_coin: &str) -> VenueResult<f64>;

    /// Submit a market order; returns the venue order id.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        size: f64,
        reduce_only: bool,
        client_oid: Option<&str>,
    ) -> VenueResult<String>;

    /// Place a TPSL plan order; returns the plan order id.
    async fn place_tpsl(&self, req: &TpslRequest) -> VenueResult<String>;

    /// Re-price an existing plan order; returns the (possibly new) order id.
    async fn modify_tpsl(
        &self,
        order_id: &str,
        symbol: &str,
        new_trigger_price: f64,
        new_execute_price: Option<f64>,
        new_size: Option<f64>,
    ) -> VenueResult<String>;

    /// Cancel a plan order.
    async fn cancel_tpsl(&self, order_id: &str, symbol: &str, plan: PlanType) -> VenueResult<()>;

    /// Pending plan orders for a symbol.
    async fn pending_plans(&self, symbol: &str) -> VenueResult<Vec<PlanOrderInfo>>;

    /// Open-position snapshots, optionally filtered by symbol.
    async fn positions(&self, symbol: Option<&str>) -> VenueResult<Vec<VenuePosition>>;

    /// Recently closed positions with realised pnl.
    async fn history_positions(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> VenueResult<Vec<ClosedPosition>>;
}
