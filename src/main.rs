use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ohlc_engine::config::AggregatorConfig;
use ohlc_engine::{csv_io, ohlc, refresh, tick};
use signal_engine::DetectorConfig;

/// Name of the signal output file, next to the snapshot data.
const SIGNAL_FILE: &str = "detect.csv";

const DEFAULT_CONFIG_PATH: &str = "scanner_config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AppConfig {
    #[serde(default)]
    aggregator: AggregatorConfig,
    #[serde(default)]
    detector: DetectorConfig,
}

impl AppConfig {
    fn load(path: &str) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
    }
}

/// Full export pass: rebuild the tick stream, write one candle file per
/// session plus the merged file, and return the merged batch for detection.
fn export_all(cfg: &AggregatorConfig) -> Result<Vec<ohlc::Candle>> {
    let outcome = tick::ingest_dir(cfg)?;
    info!(
        ticks = outcome.ticks.len(),
        skipped_files = outcome.skipped.len(),
        "tick stream rebuilt"
    );
    for skip in &outcome.skipped {
        debug!(file = %skip.path.display(), reason = ?skip.reason, "file skipped");
    }

    for window in &cfg.sessions {
        let candles = ohlc::aggregate_session(&outcome.ticks, window, cfg.timeframe_minutes)?;
        let path = cfg
            .data_dir
            .join(ohlc::session_file_name(cfg.timeframe_minutes, &window.label()));
        csv_io::write_csv(&candles, &path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(session = %window.label(), rows = candles.len(), "session file written");
    }

    let merged = ohlc::aggregate_all(&outcome.ticks, &cfg.sessions, cfg.timeframe_minutes)?;
    let merged_path = cfg.data_dir.join(ohlc::MERGED_FILE);
    csv_io::write_csv(&merged, &merged_path)
        .with_context(|| format!("writing {}", merged_path.display()))?;
    info!(rows = merged.len(), file = %merged_path.display(), "merged candles written");

    Ok(merged)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut config = AppConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(path = %config_path, error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    config.aggregator.apply_env_override();
    config
        .aggregator
        .validate()
        .context("invalid scanner configuration")?;

    info!(
        data_dir = %config.aggregator.data_dir.display(),
        timeframe_minutes = config.aggregator.timeframe_minutes,
        sessions = config.aggregator.sessions.len(),
        poll_secs = config.aggregator.poll_secs,
        "scanner starting"
    );

    let merged = export_all(&config.aggregator)?;

    let annotated = signal_engine::annotate(&merged, &config.detector);
    let flagged = annotated.iter().filter(|s| s.signal).count();
    let signal_path = config.aggregator.data_dir.join(SIGNAL_FILE);
    signal_engine::write_signal_csv(&annotated, &signal_path)
        .with_context(|| format!("writing {}", signal_path.display()))?;
    info!(candles = merged.len(), flagged, "signal pass complete");

    refresh::run(&config.aggregator);
    Ok(())
}
