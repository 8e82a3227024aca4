// =============================================================================
// Position Journal — durable symbol → PositionRecord map with atomic rewrite
// =============================================================================
//
// The journal is a recovery hint, not a ledger: it is loaded once at startup
// and each loaded record is reconciled against the venue by its monitor.
// Writes are full-file rewrites using a tmp + rename pattern so a crash
// mid-write never corrupts the file.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::types::PositionRecord;

/// Default on-disk location of the journal.
pub const DEFAULT_JOURNAL_PATH: &str = "data/active_positions.json";

/// Durable store for the active-position map.
#[derive(Debug, Clone)]
pub struct PositionJournal {
    path: PathBuf,
}

impl PositionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted map. A missing file is an empty map, not an error.
    pub fn load(&self) -> Result<HashMap<String, PositionRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no journal file — starting empty");
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read journal at {}", self.path.display()))?;
        let positions: HashMap<String, PositionRecord> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse journal at {}", self.path.display()))?;

        info!(
            count = positions.len(),
            symbols = ?positions.keys().collect::<Vec<_>>(),
            path = %self.path.display(),
            "persisted positions loaded"
        );
        Ok(positions)
    }

    /// Rewrite the whole journal atomically (write `.tmp`, then rename).
    pub fn save(&self, positions: &HashMap<String, PositionRecord>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(positions)
            .context("failed to serialise position journal")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp journal to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp journal to {}", self.path.display()))?;

        debug!(count = positions.len(), path = %self.path.display(), "journal saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn record(symbol: &str) -> PositionRecord {
        PositionRecord {
            symbol: symbol.to_string(),
            side: Side::Long,
            size: 0.01,
            entry_price: 50_000.0,
            stop_loss_price: 49_000.0,
            take_profit_price: 51_500.0,
            main_order_id: "oid-1".into(),
            stop_loss_order_id: Some("sl-1".into()),
            take_profit_order_id: Some("tp-1".into()),
            opened_at: "t0".into(),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "zenith_journal_{name}_{}.json",
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn missing_file_loads_empty() {
        let journal = PositionJournal::new(temp_path("missing"));
        assert!(journal.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let path = temp_path("roundtrip");
        let journal = PositionJournal::new(path.clone());
        let mut map = HashMap::new();
        map.insert("BTCUSDT".to_string(), record("BTCUSDT"));
        map.insert("ETHUSDT".to_string(), record("ETHUSDT"));

        journal.save(&map).unwrap();
        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["BTCUSDT"].entry_price, 50_000.0);
        assert_eq!(loaded["ETHUSDT"].stop_loss_order_id.as_deref(), Some("sl-1"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let path = temp_path("overwrite");
        let journal = PositionJournal::new(path.clone());
        let mut map = HashMap::new();
        map.insert("BTCUSDT".to_string(), record("BTCUSDT"));
        journal.save(&map).unwrap();

        map.remove("BTCUSDT");
        journal.save(&map).unwrap();
        assert!(journal.load().unwrap().is_empty());

        std::fs::remove_file(path).ok();
    }
}
