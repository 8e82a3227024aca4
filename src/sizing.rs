// =============================================================================
// Sizing & Bracket Calculator — risk budget to contracts, SL/TP derivation
// =============================================================================
//
// size = (equity · risk_fraction) / (price · stop_loss_fraction), floored at
// a per-instrument minimum, then quantized to the venue's tradable grid.
// Take-profit sits at 1.5× the stop distance on the profitable side.
// =============================================================================

use crate::bitget::precision::InstrumentSpec;
use crate::error::AdmissionError;
use crate::types::Side;

/// Reward-to-risk ratio for the take-profit leg.
pub const REWARD_RISK_RATIO: f64 = 1.5;

/// Minimum order size in contracts.
const MIN_SIZE_FLOOR: f64 = 0.01;
/// Minimum for very low-priced instruments (one whole contract).
const LOW_PRICE_MIN_FLOOR: f64 = 1.0;
/// Prices below this mark an instrument as low-priced.
const LOW_PRICE_THRESHOLD: f64 = 0.01;

/// Sized order plus its protective bracket.
#[derive(Debug, Clone, Copy)]
pub struct TradePlan {
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Equity at risk if the stop fills at its price.
    pub risk_amount: f64,
}

/// Derive order size and bracket prices from the risk budget.
pub fn compute_plan(
    spec: &InstrumentSpec,
    side: Side,
    price: f64,
    equity: Option<f64>,
    risk_fraction: f64,
    stop_loss_fraction: f64,
) -> Result<TradePlan, AdmissionError> {
    let equity = match equity {
        Some(e) if e > 0.0 => e,
        _ => return Err(AdmissionError::InsufficientEquity),
    };

    let risk_amount = equity * risk_fraction;
    let raw_size = risk_amount / (price * stop_loss_fraction);
    let floor = if price < LOW_PRICE_THRESHOLD {
        LOW_PRICE_MIN_FLOOR
    } else {
        MIN_SIZE_FLOOR
    };
    let size = spec
        .quantize_size(raw_size.max(floor))
        .map_err(|e| AdmissionError::InvalidSize(e.to_string()))?;

    let (stop_loss, take_profit) = bracket_prices(side, price, stop_loss_fraction);

    Ok(TradePlan {
        size,
        stop_loss: spec.truncate_price(stop_loss),
        take_profit: spec.truncate_price(take_profit),
        risk_amount,
    })
}

/// Stop-loss and take-profit prices around the entry, before venue rounding.
pub fn bracket_prices(side: Side, price: f64, stop_loss_fraction: f64) -> (f64, f64) {
    match side {
        Side::Long => (
            price * (1.0 - stop_loss_fraction),
            price * (1.0 + stop_loss_fraction * REWARD_RISK_RATIO),
        ),
        Side::Short => (
            price * (1.0 + stop_loss_fraction),
            price * (1.0 - stop_loss_fraction * REWARD_RISK_RATIO),
        ),
    }
}
