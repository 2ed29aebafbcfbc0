use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim};
use tracing::{debug, warn};

use crate::config::AggregatorConfig;

// The price board export repeats its column header as a data row; that row
// carries this marker in the symbol cell.
const MARKER_SYMBOL: &str = "CK";

/// One observation of a symbol's last traded price, stamped with the capture
/// time of the snapshot file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub time: NaiveDateTime,
    pub symbol: String,
    pub price: f64,
}

/// Why a file in the snapshot directory contributed no ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Name does not carry the `YYYYMMDD_HHMMSS_` capture prefix; typically a
    /// not-yet-renamed download or one of our own output files.
    UnrecognizedName,
    /// The file could not be opened or decoded.
    Unreadable(String),
    /// Readable, but every row was filtered out (or the table was too narrow
    /// to hold the price column).
    NoValidRows,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of one full directory scan: the sorted tick stream plus the files
/// that were passed over and why.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub ticks: Vec<Tick>,
    pub skipped: Vec<SkippedFile>,
}

/// Extract the capture timestamp from a snapshot file name.
///
/// Accepts `YYYYMMDD_HHMMSS_<anything>.csv` with a case-insensitive
/// extension and returns `None` for everything else.
pub fn capture_time_from_name(name: &str) -> Option<NaiveDateTime> {
    let bytes = name.as_bytes();
    if bytes.len() < 20 || bytes[8] != b'_' || bytes[15] != b'_' {
        return None;
    }
    if !name.get(name.len() - 4..)?.eq_ignore_ascii_case(".csv") {
        return None;
    }
    NaiveDateTime::parse_from_str(&name[..15], "%Y%m%d_%H%M%S").ok()
}

/// Read the (symbol, price) pairs from one snapshot file.
///
/// Columns are addressed by ordinal position, not header name; the export's
/// header row is decoded like any other row and dropped by the marker check.
fn read_symbol_price(path: &Path, cfg: &AggregatorConfig) -> Result<Vec<(String, f64)>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    if reader.headers()?.len() <= cfg.price_col {
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("decoding {}", path.display()))?;

        let symbol = match record.get(cfg.symbol_col) {
            Some(s) => s.trim(),
            None => continue,
        };
        if symbol.is_empty() || symbol.eq_ignore_ascii_case(MARKER_SYMBOL) {
            continue;
        }

        let price = match record
            .get(cfg.price_col)
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            Some(p) if p.is_finite() => p,
            _ => continue,
        };

        rows.push((symbol.to_string(), price));
    }
    Ok(rows)
}

/// Rebuild the tick stream from every snapshot currently in the directory.
///
/// Per-file problems skip that file and keep going; only an unreadable
/// directory is an error. Ticks come back sorted by (symbol, time), the
/// order the aggregation step expects.
pub fn ingest_dir(cfg: &AggregatorConfig) -> Result<IngestOutcome> {
    let entries = std::fs::read_dir(&cfg.data_dir)
        .with_context(|| format!("reading snapshot directory {}", cfg.data_dir.display()))?;

    let mut outcome = IngestOutcome::default();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };

        let stamp = match capture_time_from_name(name) {
            Some(ts) => ts,
            None => {
                outcome.skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::UnrecognizedName,
                });
                continue;
            }
        };

        match read_symbol_price(&path, cfg) {
            Ok(rows) if rows.is_empty() => outcome.skipped.push(SkippedFile {
                path,
                reason: SkipReason::NoValidRows,
            }),
            Ok(rows) => {
                for (symbol, price) in rows {
                    outcome.ticks.push(Tick {
                        time: stamp,
                        symbol,
                        price,
                    });
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping snapshot file");
                outcome.skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::Unreadable(e.to_string()),
                });
            }
        }
    }

    outcome
        .ticks
        .sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.time.cmp(&b.time)));
    debug!(
        ticks = outcome.ticks.len(),
        skipped = outcome.skipped.len(),
        "snapshot scan complete"
    );
    Ok(outcome)
}
