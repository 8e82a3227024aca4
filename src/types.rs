// =============================================================================
// Shared types used across the Zenith execution engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side ("buy"/"sell") that opens a position in this direction.
    pub fn order_side(&self) -> &'static str {
        match self {
            Self::Long => "buy",
            Self::Short => "sell",
        }
    }

    /// Order side that closes a position in this direction.
    pub fn closing_order_side(&self) -> &'static str {
        match self {
            Self::Long => "sell",
            Self::Short => "buy",
        }
    }

    /// Venue-side directional tag of an existing position.
    pub fn hold_side(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    /// Parse a venue `holdSide` value (case-insensitive).
    pub fn from_hold_side(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }

    /// +1 for longs, −1 for shorts; multiplies price deltas into pnl.
    pub fn direction(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hold_side())
    }
}

/// Directional trade signal produced outside the engine.
///
/// `signal_type` carries a free-form label ("StrongBuy", "Sell", ...); the
/// direction is derived by substring. `timestamp` is opaque and preserved
/// verbatim on the resulting position record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub signal_type: String,
    pub price: f64,
    pub timestamp: String,
}

impl TradeSignal {
    /// Derive the position direction from the signal label.
    pub fn side(&self) -> Option<Side> {
        if self.signal_type.contains("Buy") {
            Some(Side::Long)
        } else if self.signal_type.contains("Sell") {
            Some(Side::Short)
        } else {
            None
        }
    }
}

/// A tracked open position; the unit of the journal and the position map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub side: Side,
    /// Contracts, always positive.
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub main_order_id: String,
    #[serde(default)]
    pub stop_loss_order_id: Option<String>,
    #[serde(default)]
    pub take_profit_order_id: Option<String>,
    /// Signal timestamp, stored verbatim.
    pub opened_at: String,
}

/// Margin coin for a symbol: USDC-margined contracts carry the substring.
pub fn quote_coin(symbol: &str) -> &'static str {
    if symbol.contains("USDC") {
        "USDC"
    } else {
        "USDT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_derivation_from_signal_label() {
        let buy = TradeSignal {
            symbol: "BTCUSDT".into(),
            signal_type: "StrongBuy".into(),
            price: 50_000.0,
            timestamp: "t0".into(),
        };
        assert_eq!(buy.side(), Some(Side::Long));

        let sell = TradeSignal {
            signal_type: "Sell".into(),
            ..buy.clone()
        };
        assert_eq!(sell.side(), Some(Side::Short));

        let junk = TradeSignal {
            signal_type: "Hold".into(),
            ..buy
        };
        assert_eq!(junk.side(), None);
    }

    #[test]
    fn order_sides() {
        assert_eq!(Side::Long.order_side(), "buy");
        assert_eq!(Side::Long.closing_order_side(), "sell");
        assert_eq!(Side::Short.order_side(), "sell");
        assert_eq!(Side::Short.closing_order_side(), "buy");
        assert_eq!(Side::from_hold_side("LONG"), Some(Side::Long));
        assert_eq!(Side::from_hold_side("short"), Some(Side::Short));
        assert_eq!(Side::from_hold_side("net"), None);
    }

    #[test]
    fn quote_coin_from_symbol() {
        assert_eq!(quote_coin("BTCUSDT"), "USDT");
        assert_eq!(quote_coin("ETHUSDC"), "USDC");
        assert_eq!(quote_coin("SATSUSDT"), "USDT");
    }

    #[test]
    fn position_record_roundtrip() {
        let rec = PositionRecord {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            size: 0.01,
            entry_price: 50_000.0,
            stop_loss_price: 49_000.0,
            take_profit_price: 51_500.0,
            main_order_id: "1".into(),
            stop_loss_order_id: Some("2".into()),
            take_profit_order_id: None,
            opened_at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: PositionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbol, rec.symbol);
        assert_eq!(back.side, Side::Long);
        assert_eq!(back.take_profit_order_id, None);
        assert_eq!(back.opened_at, rec.opened_at);
    }
}
