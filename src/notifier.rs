// =============================================================================
// Notifier interface — structured trade events for an opaque operator sink
// =============================================================================
//
// The engine only produces events; delivery is someone else's problem and a
// delivery failure must never affect trading state.
// =============================================================================

use tracing::info;

use crate::types::Side;

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A trade lifecycle event.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    Entry {
        symbol: String,
        side: Side,
        entry_price: f64,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
        risk_amount: f64,
        equity: f64,
    },
    Closed {
        symbol: String,
        side: Side,
        entry_price: f64,
        exit_price: f64,
        size: f64,
        pnl_percent: f64,
        reason: CloseReason,
    },
}

/// Operator notification sink.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: &NotifyEvent);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn emit(&self, event: &NotifyEvent) {
        match event {
            NotifyEvent::Entry {
                symbol,
                side,
                entry_price,
                size,
                stop_loss,
                take_profit,
                risk_amount,
                equity,
            } => info!(
                symbol,
                %side,
                entry_price,
                size,
                stop_loss,
                take_profit,
                risk_amount,
                equity,
                "position opened"
            ),
            NotifyEvent::Closed {
                symbol,
                side,
                entry_price,
                exit_price,
                size,
                pnl_percent,
                reason,
            } => info!(
                symbol,
                %side,
                entry_price,
                exit_price,
                size,
                pnl_percent = format!("{pnl_percent:.2}"),
                %reason,
                "position closed"
            ),
        }
    }
}
