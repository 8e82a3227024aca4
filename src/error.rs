// =============================================================================
// Error taxonomy — closed sum types for venue I/O and signal admission
// =============================================================================
//
// Venue errors separate transport failures (retryable) from business
// rejections (never retried). Admission errors are the single terminal
// outcome of a rejected signal; each carries enough context for the
// operator-facing reason string.
// =============================================================================

use thiserror::Error;

/// Transport-level failure class. Only `Connect` and `Timeout` are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Other,
}

impl TransportKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect | Self::Timeout)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure of a single venue operation.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Network-level failure after the retry budget is exhausted.
    #[error("venue unavailable ({kind}): {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    /// The venue answered with a non-success business code.
    #[error("venue rejected request (code {code}): {message}")]
    Business { code: String, message: String },

    /// Order size fell outside the instrument's tradable bounds.
    #[error("invalid order size: {0}")]
    InvalidSize(String),

    /// Price failed the instrument precision precheck.
    #[error("invalid order price: {0}")]
    InvalidPrice(String),

    /// The requested entity does not exist on the venue.
    #[error("not found: {0}")]
    NotFound(String),

    /// The venue answered, but the payload did not have the expected shape.
    #[error("malformed venue response: {0}")]
    Malformed(String),
}

pub type VenueResult<T> = Result<T, VenueError>;

/// Terminal outcome of a rejected signal admission.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("position for {0} already exists")]
    Duplicate(String),

    #[error("max concurrent positions reached ({0})")]
    CapacityExceeded(usize),

    #[error("signal rejected: {0}")]
    InvalidSignal(String),

    #[error("risk rejected: {0}")]
    RiskRejected(String),

    #[error("circuit breaker open: {reason} ({remaining_secs}s until auto-reset)")]
    CircuitOpen { reason: String, remaining_secs: u64 },

    #[error("could not determine account equity")]
    InsufficientEquity,

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid bracket: {0}")]
    InvalidBracket(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("no tracked position for {0}")]
    UnknownPosition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_retryability() {
        assert!(TransportKind::Connect.is_retryable());
        assert!(TransportKind::Timeout.is_retryable());
        assert!(!TransportKind::Other.is_retryable());
    }

    #[test]
    fn circuit_open_message_carries_remaining_time() {
        let err = AdmissionError::CircuitOpen {
            reason: "daily loss 4.00% breached limit 3.00%".into(),
            remaining_secs: 3600,
        };
        let msg = err.to_string();
        assert!(msg.contains("4.00%"));
        assert!(msg.contains("3600s"));
    }
}
