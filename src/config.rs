// =============================================================================
// Execution configuration — validated [execution] block from config.toml
// =============================================================================
//
// Loaded once at startup; nothing reads the file or the environment in hot
// paths. Optional keys carry serde defaults so an older config file keeps
// loading after new knobs are added.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

/// Candidate config locations, tried in order.
const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config/config.toml",
    "../config/config.toml",
    "../../config/config.toml",
];

fn default_max_portfolio_risk() -> f64 {
    0.05
}

fn default_max_daily_loss() -> f64 {
    0.03
}

fn default_circuit_duration_secs() -> u64 {
    3600
}

/// Tunable execution parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Ceiling on simultaneously open positions.
    pub max_concurrent_positions: usize,

    /// Stop-loss distance as a fraction of entry price (e.g. 0.02 = 2 %).
    pub stop_loss_percent: f64,

    /// Per-trade risk as a fraction of account equity.
    pub risk_percentage: f64,

    /// Reserved: scale risk with recent performance.
    pub use_dynamic_risk: bool,

    /// Maximum aggregate exposure as a fraction of equity.
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk_percentage: f64,

    /// Daily loss fraction at which the circuit breaker trips.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss_percentage: f64,

    /// Seconds until a tripped breaker auto-resets.
    #[serde(default = "default_circuit_duration_secs")]
    pub max_circuit_breaker_duration: u64,

    /// Simulate order placement instead of hitting the venue.
    #[serde(default)]
    pub paper_trading: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    execution: ExecutionConfig,
}

impl ExecutionConfig {
    /// Search the standard locations and load the first config file found.
    pub fn load() -> Result<Self> {
        for candidate in CONFIG_SEARCH_PATHS {
            if Path::new(candidate).exists() {
                return Self::from_path(candidate);
            }
        }
        bail!(
            "config.toml not found in any of: {}",
            CONFIG_SEARCH_PATHS.join(", ")
        );
    }

    /// Load and validate configuration from a specific path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("invalid config at {}", path.display()))?;

        info!(
            path = %path.display(),
            max_concurrent_positions = config.max_concurrent_positions,
            stop_loss_percent = config.stop_loss_percent,
            risk_percentage = config.risk_percentage,
            paper_trading = config.paper_trading,
            "execution config loaded"
        );
        Ok(config)
    }

    /// Parse and validate an in-memory TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).context("failed to parse [execution] config block")?;
        file.execution.validate()?;
        Ok(file.execution)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_positions == 0 {
            bail!("max_concurrent_positions must be positive");
        }
        if self.stop_loss_percent <= 0.0 || self.stop_loss_percent >= 1.0 {
            bail!("stop_loss_percent must be between 0 and 1");
        }
        if self.risk_percentage <= 0.0 || self.risk_percentage >= 1.0 {
            bail!("risk_percentage must be between 0 and 1");
        }
        if self.max_portfolio_risk_percentage <= 0.0 || self.max_portfolio_risk_percentage > 1.0 {
            bail!("max_portfolio_risk_percentage must be in (0, 1]");
        }
        if self.max_daily_loss_percentage <= 0.0 || self.max_daily_loss_percentage > 1.0 {
            bail!("max_daily_loss_percentage must be in (0, 1]");
        }
        if self.max_circuit_breaker_duration == 0 {
            bail!("max_circuit_breaker_duration must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [execution]
        max_concurrent_positions = 3
        stop_loss_percent = 0.02
        risk_percentage = 0.01
        use_dynamic_risk = false
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = ExecutionConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.max_concurrent_positions, 3);
        assert!((cfg.max_portfolio_risk_percentage - 0.05).abs() < f64::EPSILON);
        assert!((cfg.max_daily_loss_percentage - 0.03).abs() < f64::EPSILON);
        assert_eq!(cfg.max_circuit_breaker_duration, 3600);
        assert!(!cfg.paper_trading);
    }

    #[test]
    fn full_config_overrides_defaults() {
        let cfg = ExecutionConfig::from_toml(
            r#"
            [execution]
            max_concurrent_positions = 5
            stop_loss_percent = 0.03
            risk_percentage = 0.02
            use_dynamic_risk = true
            max_portfolio_risk_percentage = 0.10
            max_daily_loss_percentage = 0.05
            max_circuit_breaker_duration = 900
            paper_trading = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_circuit_breaker_duration, 900);
        assert!(cfg.paper_trading);
        assert!(cfg.use_dynamic_risk);
    }

    #[test]
    fn out_of_range_values_rejected() {
        let bad = MINIMAL.replace("stop_loss_percent = 0.02", "stop_loss_percent = 1.5");
        assert!(ExecutionConfig::from_toml(&bad).is_err());

        let bad = MINIMAL.replace("max_concurrent_positions = 3", "max_concurrent_positions = 0");
        assert!(ExecutionConfig::from_toml(&bad).is_err());

        let bad = MINIMAL.replace("risk_percentage = 0.01", "risk_percentage = 0.0");
        assert!(ExecutionConfig::from_toml(&bad).is_err());
    }

    #[test]
    fn missing_required_key_rejected() {
        let bad = r#"
            [execution]
            max_concurrent_positions = 3
            stop_loss_percent = 0.02
            risk_percentage = 0.01
        "#;
        assert!(ExecutionConfig::from_toml(bad).is_err());
    }
}
