// =============================================================================
// Risk gates guarding signal admission
// =============================================================================

pub mod breaker;
pub mod daily_loss;
pub mod portfolio;

pub use breaker::CircuitBreaker;
pub use daily_loss::DailyLossTracker;
pub use portfolio::PortfolioRiskTracker;
