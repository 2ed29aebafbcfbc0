use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::csv_io::{self, CsvRecord};

fn default_interval() -> String {
    "1D".to_string()
}

fn default_take_last_n() -> usize {
    60
}

fn default_symbol_sleep_ms() -> u64 {
    1500
}

fn default_batch_pause_secs() -> u64 {
    120
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Settings for the daily-history download utility.
///
/// The quote endpoint rate-limits aggressively, so the symbol universe is
/// fetched in two batches with a pause in between and a sleep after every
/// symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Quote-history endpoint; queried with `symbol`, `start` and
    /// `interval` parameters and expected to answer with a JSON array of
    /// bars.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub symbols: Vec<String>,

    /// First day requested, `YYYY-MM-DD`. Request more than needed so the
    /// trailing window is always full.
    #[serde(default)]
    pub start: String,

    #[serde(default = "default_interval")]
    pub interval: String,

    /// Trailing bars kept per symbol after normalization.
    #[serde(default = "default_take_last_n")]
    pub take_last_n: usize,

    #[serde(default = "default_symbol_sleep_ms")]
    pub symbol_sleep_ms: u64,

    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: u64,

    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl HistoryConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading history config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing history config {}", path.display()))
    }
}

/// One daily OHLCV bar of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBar {
    pub symbol: String,
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CsvRecord for HistoryBar {
    fn headers() -> &'static [&'static str] {
        &["symbol", "time", "open", "high", "low", "close", "volume"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.symbol.clone(),
            self.time.format("%Y-%m-%d").to_string(),
            format!("{:.6}", self.open),
            format!("{:.6}", self.high),
            format!("{:.6}", self.low),
            format!("{:.6}", self.close),
            format!("{:.6}", self.volume),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub symbol: String,
    pub error: String,
}

impl CsvRecord for FetchFailure {
    fn headers() -> &'static [&'static str] {
        &["symbol", "error"]
    }

    fn record(&self) -> Vec<String> {
        vec![self.symbol.clone(), self.error.clone()]
    }
}

// Bar fields arrive as numbers from some sources and as strings from others.
fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bar_date(v: &Value) -> Option<NaiveDate> {
    let s = v.as_str()?.trim();
    let date_part = s.split(|c| c == 'T' || c == ' ').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Decode a quote-history response body into bars for `symbol`.
///
/// Accepts a bare JSON array or a `{"data": [...]}` envelope. Rows missing a
/// field, or whose close or volume is not a finite number, are dropped.
pub fn parse_history(symbol: &str, body: &Value) -> Result<Vec<HistoryBar>> {
    let rows = body
        .as_array()
        .or_else(|| body.get("data").and_then(Value::as_array))
        .context("history response is not a bar array")?;

    let mut bars = Vec::new();
    for row in rows {
        let time = match row.get("time").or_else(|| row.get("date")).and_then(bar_date) {
            Some(d) => d,
            None => continue,
        };
        let fields = [
            row.get("open").and_then(value_f64),
            row.get("high").and_then(value_f64),
            row.get("low").and_then(value_f64),
            row.get("close").and_then(value_f64),
            row.get("volume").and_then(value_f64),
        ];
        match fields {
            [Some(open), Some(high), Some(low), Some(close), Some(volume)]
                if close.is_finite() && volume.is_finite() =>
            {
                bars.push(HistoryBar {
                    symbol: symbol.to_string(),
                    time,
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
            _ => continue,
        }
    }
    Ok(bars)
}

/// Sort ascending by day and keep the trailing `take_last_n` bars.
pub fn normalize(mut bars: Vec<HistoryBar>, take_last_n: usize) -> Vec<HistoryBar> {
    bars.sort_by(|a, b| a.time.cmp(&b.time));
    let cut = bars.len().saturating_sub(take_last_n);
    bars.split_off(cut)
}

fn fetch_symbol(
    client: &reqwest::blocking::Client,
    cfg: &HistoryConfig,
    symbol: &str,
) -> Result<Vec<HistoryBar>> {
    let response = client
        .get(&cfg.base_url)
        .query(&[
            ("symbol", symbol),
            ("start", cfg.start.as_str()),
            ("interval", cfg.interval.as_str()),
        ])
        .send()
        .with_context(|| format!("requesting history for {symbol}"))?
        .error_for_status()
        .with_context(|| format!("history request for {symbol} rejected"))?;

    let body: Value = response
        .json()
        .with_context(|| format!("decoding history body for {symbol}"))?;
    let bars = parse_history(symbol, &body)?;
    if bars.is_empty() {
        bail!("empty history returned for {symbol}");
    }
    Ok(normalize(bars, cfg.take_last_n))
}

fn fetch_batch(
    client: &reqwest::blocking::Client,
    cfg: &HistoryConfig,
    symbols: &[String],
    batch_name: &str,
) -> (Vec<HistoryBar>, Vec<FetchFailure>) {
    let mut bars = Vec::new();
    let mut failed = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        match fetch_symbol(client, cfg, symbol) {
            Ok(mut rows) => {
                info!(
                    batch = batch_name,
                    symbol = %symbol,
                    n = i + 1,
                    of = symbols.len(),
                    rows = rows.len(),
                    "history fetched"
                );
                bars.append(&mut rows);
            }
            Err(e) => {
                warn!(batch = batch_name, symbol = %symbol, error = %e, "history fetch failed");
                failed.push(FetchFailure {
                    symbol: symbol.clone(),
                    error: format!("{batch_name}: {e:#}"),
                });
            }
        }
        std::thread::sleep(Duration::from_millis(cfg.symbol_sleep_ms));
    }

    (bars, failed)
}

/// Download the configured universe in two rate-limited batches and write
/// the merged, per-batch and failure CSVs.
pub fn run(cfg: &HistoryConfig) -> Result<()> {
    if cfg.base_url.trim().is_empty() {
        bail!("history base_url is not configured");
    }
    if cfg.symbols.is_empty() {
        bail!("history symbol list is empty");
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building http client")?;

    let half = (cfg.symbols.len() + 1) / 2;
    let (first, second) = cfg.symbols.split_at(half);

    info!(batch = "1", symbols = first.len(), "fetching first batch");
    let (bars1, failed1) = fetch_batch(&client, cfg, first, "batch1");
    if !bars1.is_empty() {
        csv_io::write_csv(&bars1, cfg.out_dir.join("history_batch1.csv"))?;
    }

    let mut bars2 = Vec::new();
    let mut failed2 = Vec::new();
    if !second.is_empty() {
        info!(pause_secs = cfg.batch_pause_secs, "pausing between batches");
        std::thread::sleep(Duration::from_secs(cfg.batch_pause_secs));

        info!(batch = "2", symbols = second.len(), "fetching second batch");
        let (bars, failed) = fetch_batch(&client, cfg, second, "batch2");
        bars2 = bars;
        failed2 = failed;
        if !bars2.is_empty() {
            csv_io::write_csv(&bars2, cfg.out_dir.join("history_batch2.csv"))?;
        }
    }

    let mut merged = bars1;
    merged.append(&mut bars2);
    if merged.is_empty() {
        bail!("no history downloaded for any symbol");
    }
    let final_path = cfg
        .out_dir
        .join(format!("daily_last{}.csv", cfg.take_last_n));
    csv_io::write_csv(&merged, &final_path)?;
    info!(file = %final_path.display(), rows = merged.len(), "history written");

    let mut failed = failed1;
    failed.append(&mut failed2);
    if !failed.is_empty() {
        let failed_path = cfg.out_dir.join("history_failed.csv");
        csv_io::write_csv(&failed, &failed_path)?;
        warn!(file = %failed_path.display(), symbols = failed.len(), "some symbols failed");
    }

    Ok(())
}
