use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ohlc_engine::history::{self, HistoryConfig};

const DEFAULT_CONFIG_PATH: &str = "history_config.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = HistoryConfig::load(&config_path)?;
    history::run(&config)
}
