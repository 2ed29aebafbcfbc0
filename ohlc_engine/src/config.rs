use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::{self, SessionWindow};

/// Environment variable that overrides the snapshot directory.
pub const DATA_DIR_ENV: &str = "SCANNER_DATA_DIR";

fn default_data_dir() -> PathBuf {
    PathBuf::from("trading_data")
}

fn default_timeframe_minutes() -> u32 {
    60
}

fn default_symbol_col() -> usize {
    0
}

// Column K of the price board export, "Khớp lệnh - Giá".
fn default_price_col() -> usize {
    10
}

fn default_poll_secs() -> u64 {
    60
}

/// Settings for the tick-to-candle pipeline and its refresh loop.
///
/// All fields carry `#[serde(default)]` so a partial config file only has to
/// name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Directory the snapshot exports land in. Candle and signal files are
    /// written back into the same directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Candle width in minutes.
    #[serde(default = "default_timeframe_minutes")]
    pub timeframe_minutes: u32,

    /// Ordinal index of the symbol column in a snapshot row.
    #[serde(default = "default_symbol_col")]
    pub symbol_col: usize,

    /// Ordinal index of the last-traded-price column.
    #[serde(default = "default_price_col")]
    pub price_col: usize,

    /// Ordered, non-overlapping intraday session table.
    #[serde(default = "session::default_windows")]
    pub sessions: Vec<SessionWindow>,

    /// Refresh loop polling interval in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            data_dir: default_data_dir(),
            timeframe_minutes: default_timeframe_minutes(),
            symbol_col: default_symbol_col(),
            price_col: default_price_col(),
            sessions: session::default_windows(),
            poll_secs: default_poll_secs(),
        }
    }
}

impl AggregatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Replace the data directory from `SCANNER_DATA_DIR` when set.
    pub fn apply_env_override(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                info!(dir = %dir, "data directory overridden from {DATA_DIR_ENV}");
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Reject configurations the pipeline cannot run with. Called once at
    /// startup; the aggregation passes assume a validated config.
    pub fn validate(&self) -> Result<()> {
        if self.timeframe_minutes == 0 {
            bail!("timeframe_minutes must be at least 1");
        }
        if self.sessions.is_empty() {
            bail!("at least one session window is required");
        }
        session::validate_windows(&self.sessions)?;
        Ok(())
    }
}
