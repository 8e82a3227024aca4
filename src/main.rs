// =============================================================================
// Zenith Executor — Main Entry Point
// =============================================================================
//
// Wires the venue client, trade manager, and journal recovery together.
// Signals are produced elsewhere and arrive as `EngineCommand`s over the
// ingress channel; this process owns execution and risk only.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod balance;
mod bitget;
mod clock;
mod config;
mod error;
mod journal;
mod manager;
mod monitor;
mod notifier;
mod risk;
mod sizing;
#[cfg(test)]
mod testkit;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::SystemClock;
use crate::config::ExecutionConfig;
use crate::journal::{PositionJournal, DEFAULT_JOURNAL_PATH};
use crate::manager::TradeManager;
use crate::notifier::LogNotifier;
use crate::types::TradeSignal;

/// Commands accepted from the signal producer.
pub enum EngineCommand {
    /// Admit a directional signal.
    Signal(TradeSignal),
    /// Close the position for a symbol.
    Close(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Zenith Executor starting up");

    let config = ExecutionConfig::load().context("execution config is required")?;

    let api_key = std::env::var("BITGET_API_KEY").unwrap_or_default();
    let secret_key = std::env::var("BITGET_SECRET_KEY").unwrap_or_default();
    let passphrase = std::env::var("BITGET_PASSPHRASE").unwrap_or_default();
    if !config.paper_trading && (api_key.is_empty() || secret_key.is_empty()) {
        warn!("BITGET_API_KEY / BITGET_SECRET_KEY not set — private endpoints will fail");
    }

    // ── 2. Venue client & trade manager ──────────────────────────────────
    let venue = Arc::new(bitget::BitgetClient::new(api_key, secret_key, passphrase));
    let manager = TradeManager::new(
        venue.clone(),
        config,
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        PositionJournal::new(DEFAULT_JOURNAL_PATH),
    );

    // Warm the instrument-precision cache; sizing falls back to defaults
    // per symbol if this fails.
    match manager.venue().list_instruments().await {
        Ok(specs) => info!(count = specs.len(), "instrument precision cache warmed"),
        Err(e) => warn!(error = %e, "could not prefetch instrument specs"),
    }

    // ── 3. Recover persisted positions ───────────────────────────────────
    match manager.resume_from_journal() {
        Ok(resumed) => info!(resumed, "journal recovery complete"),
        Err(e) => error!(error = %e, "journal recovery failed — starting with empty book"),
    }

    // ── 4. Command ingress ───────────────────────────────────────────────
    // The screener/strategy process pushes commands into this channel; each
    // admission runs to its single terminal outcome here.
    let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(64);
    let ingress_manager = manager.clone();
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            match command {
                EngineCommand::Signal(signal) => {
                    let symbol = signal.symbol.clone();
                    match ingress_manager.submit_signal(&signal).await {
                        Ok(record) => info!(
                            %symbol,
                            size = record.size,
                            entry = record.entry_price,
                            "signal admitted"
                        ),
                        Err(e) => warn!(%symbol, reason = %e, "signal rejected"),
                    }
                }
                EngineCommand::Close(symbol) => {
                    match ingress_manager.close_position(&symbol).await {
                        Ok(outcome) => info!(%symbol, ?outcome, "close request handled"),
                        Err(e) => warn!(%symbol, error = %e, "close request failed"),
                    }
                }
            }
        }
    });
    // Thin stdin producer: one JSON signal per line, or `close <SYMBOL>`.
    // The real screener/strategy process owns signal generation; this keeps
    // the engine drivable without it.
    tokio::spawn(async move {
        use tokio::io::AsyncBufReadExt;
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            let command = if let Some(symbol) = line.strip_prefix("close ") {
                EngineCommand::Close(symbol.trim().to_string())
            } else {
                match serde_json::from_str::<TradeSignal>(&line) {
                    Ok(signal) => EngineCommand::Signal(signal),
                    Err(e) => {
                        warn!(error = %e, "unparseable input line ignored");
                        continue;
                    }
                }
            };
            if command_tx.send(command).await.is_err() {
                break;
            }
        }
    });

    // ── 5. Periodic risk summary ─────────────────────────────────────────
    let summary_manager = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let summary = summary_manager.position_summary().await;
            info!(
                open = summary.total_positions,
                capacity = summary.max_concurrent_positions,
                total_at_risk = summary.total_at_risk,
                wallet_balance = summary.wallet_balance,
                risk_pct = summary.risk_percentage_of_balance,
                breaker_active = summary.circuit_breaker_active,
                daily_pnl = summary_manager.daily_loss().daily_pnl(),
                "risk summary"
            );
        }
    });

    info!("Execution engine running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");
    manager.shutdown();
    info!("Zenith Executor shut down complete.");
    Ok(())
}
