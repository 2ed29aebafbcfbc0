use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use ohlc_engine::csv_io::{self, CsvRecord};
use ohlc_engine::ohlc::Candle;

fn default_min_lower_wick_pct_range() -> f64 {
    0.45
}

fn default_min_lower_wick_mult_body() -> f64 {
    2.0
}

fn default_min_close_position() -> f64 {
    0.70
}

fn default_eps() -> f64 {
    1e-9
}

/// Thresholds for the long-lower-wick reversal pattern.
///
/// All three ratio conditions are lower bounds combined with AND, so raising
/// any threshold can only shrink the flagged set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Lower wick as a share of the full candle range.
    #[serde(default = "default_min_lower_wick_pct_range")]
    pub min_lower_wick_pct_range: f64,

    /// Lower wick as a multiple of the candle body.
    #[serde(default = "default_min_lower_wick_mult_body")]
    pub min_lower_wick_mult_body: f64,

    /// How far up the range the close must sit, 0 at the low, 1 at the high.
    #[serde(default = "default_min_close_position")]
    pub min_close_position: f64,

    /// Additionally require close >= open.
    #[serde(default)]
    pub require_bullish_close: bool,

    /// Added to ratio denominators so zero-range and zero-body candles
    /// divide cleanly.
    #[serde(default = "default_eps")]
    pub eps: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_lower_wick_pct_range: default_min_lower_wick_pct_range(),
            min_lower_wick_mult_body: default_min_lower_wick_mult_body(),
            min_close_position: default_min_close_position(),
            require_bullish_close: false,
            eps: default_eps(),
        }
    }
}

/// Geometry of one candle, plus the three detector ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WickMetrics {
    pub range: f64,
    pub body: f64,
    pub lower_wick: f64,
    pub wick_pct_range: f64,
    pub wick_mult_body: f64,
    pub close_position: f64,
}

pub fn wick_metrics(candle: &Candle, eps: f64) -> WickMetrics {
    let range = (candle.high - candle.low).max(0.0);
    let body = (candle.close - candle.open).abs();
    let lower_wick = (candle.open.min(candle.close) - candle.low).max(0.0);
    WickMetrics {
        range,
        body,
        lower_wick,
        wick_pct_range: lower_wick / (range + eps),
        wick_mult_body: lower_wick / (body + eps),
        close_position: (candle.close - candle.low) / (range + eps),
    }
}

impl DetectorConfig {
    /// Does `candle` match the configured pattern?
    pub fn matches(&self, candle: &Candle) -> bool {
        let m = wick_metrics(candle, self.eps);
        m.wick_pct_range >= self.min_lower_wick_pct_range
            && m.wick_mult_body >= self.min_lower_wick_mult_body
            && m.close_position >= self.min_close_position
            && (!self.require_bullish_close || candle.close >= candle.open)
    }
}

/// A candle with its classification attached.
#[derive(Debug, Clone)]
pub struct SignalCandle {
    pub candle: Candle,
    pub signal: bool,
}

impl CsvRecord for SignalCandle {
    fn headers() -> &'static [&'static str] {
        &["date", "session", "time", "symbol", "open", "high", "low", "close", "signal"]
    }

    fn record(&self) -> Vec<String> {
        let mut row = self.candle.record();
        row.push(if self.signal { "yes" } else { "no" }.to_string());
        row
    }
}

/// Classify a whole batch, keeping every input candle alongside its flag.
pub fn annotate(candles: &[Candle], cfg: &DetectorConfig) -> Vec<SignalCandle> {
    candles
        .iter()
        .map(|c| SignalCandle {
            candle: c.clone(),
            signal: cfg.matches(c),
        })
        .collect()
}

/// Write the signal file for a batch.
///
/// When nothing is flagged the file is reduced to its header row, so
/// downstream consumers still see the full schema; otherwise the entire
/// batch is written with its yes/no column.
pub fn write_signal_csv<P: AsRef<Path>>(annotated: &[SignalCandle], path: P) -> Result<()> {
    if annotated.iter().any(|s| s.signal) {
        csv_io::write_csv(annotated, path)
    } else {
        csv_io::write_csv::<SignalCandle, _>(&[], path)
    }
}
