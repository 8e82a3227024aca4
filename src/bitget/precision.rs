// =============================================================================
// Instrument precision rules — price/size rounding before submission
// =============================================================================
//
// Rounding policy: prices and sizes are truncated toward zero, never rounded
// up. A submitted price can only be more conservative than the computed one.
// =============================================================================

use crate::error::{VenueError, VenueResult};

/// Tradable-precision rules for a single instrument.
#[derive(Debug, Clone)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub price_decimals: u32,
    pub size_decimals: u32,
    pub min_size: f64,
    pub max_size: f64,
    /// Order size must be a multiple of this step.
    pub step_size: f64,
}

impl InstrumentSpec {
    /// Conservative defaults used when the venue lookup fails.
    pub fn fallback(symbol: &str) -> Self {
        let (price_decimals, size_decimals) = if symbol.contains("SATS") {
            (8, 4)
        } else if symbol.starts_with("BTC") {
            (6, 4)
        } else if symbol.starts_with("ETH") {
            (5, 4)
        } else {
            (4, 4)
        };
        Self {
            symbol: symbol.to_string(),
            price_decimals,
            size_decimals,
            min_size: 0.0,
            max_size: f64::INFINITY,
            step_size: 1.0,
        }
    }

    /// Truncate a price toward zero to this instrument's decimal places.
    pub fn truncate_price(&self, price: f64) -> f64 {
        truncate(price, self.price_decimals)
    }

    /// Floor-quantize a size to the step grid, truncate to the size decimals,
    /// and enforce the tradable bounds.
    pub fn quantize_size(&self, size: f64) -> VenueResult<f64> {
        let stepped = if self.step_size > 0.0 {
            let ratio = size / self.step_size;
            // Nudge exact step multiples off their binary-float underrun
            // before flooring.
            (ratio + ratio.abs() * 1e-12 + 1e-9).floor() * self.step_size
        } else {
            size
        };
        let quantized = truncate(stepped, self.size_decimals);

        if quantized <= 0.0 {
            return Err(VenueError::InvalidSize(format!(
                "size {size} quantizes to zero for {} (step {})",
                self.symbol, self.step_size
            )));
        }
        if quantized < self.min_size || quantized > self.max_size {
            return Err(VenueError::InvalidSize(format!(
                "size {quantized} outside [{}, {}] for {}",
                self.min_size, self.max_size, self.symbol
            )));
        }
        Ok(quantized)
    }
}

fn truncate(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    // Relative nudge so 48999.999999999999-style underruns truncate to the
    // intended grid point instead of one step below it.
    (scaled + scaled.abs() * 1e-12 + 1e-9).trunc() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc_spec() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "BTCUSDT".into(),
            price_decimals: 1,
            size_decimals: 4,
            min_size: 0.001,
            max_size: 1000.0,
            step_size: 0.001,
        }
    }

    #[test]
    fn price_truncates_toward_zero() {
        let spec = btc_spec();
        assert_eq!(spec.truncate_price(50_388.79), 50_388.7);
        assert_eq!(spec.truncate_price(49_000.0), 49_000.0);
    }

    #[test]
    fn size_floors_to_step_grid() {
        let spec = btc_spec();
        assert_eq!(spec.quantize_size(0.01).unwrap(), 0.01);
        assert_eq!(spec.quantize_size(0.0109).unwrap(), 0.01);
        assert_eq!(spec.quantize_size(0.0026).unwrap(), 0.002);
    }

    #[test]
    fn size_bounds_enforced() {
        let spec = btc_spec();
        assert!(matches!(
            spec.quantize_size(0.0001),
            Err(VenueError::InvalidSize(_))
        ));
        assert!(matches!(
            spec.quantize_size(5000.0),
            Err(VenueError::InvalidSize(_))
        ));
    }

    #[test]
    fn integer_step_floors_fractional_sizes() {
        let spec = InstrumentSpec {
            symbol: "MYXUSDT".into(),
            price_decimals: 6,
            size_decimals: 0,
            min_size: 1.0,
            max_size: f64::INFINITY,
            step_size: 1.0,
        };
        assert_eq!(spec.quantize_size(12.7).unwrap(), 12.0);
        assert!(spec.quantize_size(0.4).is_err());
    }

    #[test]
    fn fallback_table_by_symbol_class() {
        assert_eq!(InstrumentSpec::fallback("1000SATSUSDT").price_decimals, 8);
        assert_eq!(InstrumentSpec::fallback("BTCUSDT").price_decimals, 6);
        assert_eq!(InstrumentSpec::fallback("ETHUSDT").price_decimals, 5);
        assert_eq!(InstrumentSpec::fallback("SOLUSDT").price_decimals, 4);
        let fb = InstrumentSpec::fallback("SOLUSDT");
        assert_eq!(fb.size_decimals, 4);
        assert_eq!(fb.min_size, 0.0);
        assert!(fb.max_size.is_infinite());
        assert_eq!(fb.step_size, 1.0);
    }
}
