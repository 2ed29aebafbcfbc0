use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use tracing::{debug, error, info};

use crate::config::AggregatorConfig;
use crate::csv_io;
use crate::ohlc;
use crate::session;
use crate::tick;

/// One poll of the refresh loop.
///
/// When `now` falls inside a configured session window, the snapshot
/// directory is re-ingested from scratch, that session is re-aggregated and
/// its candle file overwritten; the write is a full recomputation, so
/// repeating it is idempotent. Outside every window nothing happens and
/// `None` comes back.
pub fn refresh_once(cfg: &AggregatorConfig, now: NaiveTime) -> Result<Option<PathBuf>> {
    let window = match session::current_window(&cfg.sessions, now) {
        Some(w) => w,
        None => return Ok(None),
    };

    let outcome = tick::ingest_dir(cfg)?;
    let candles = ohlc::aggregate_session(&outcome.ticks, window, cfg.timeframe_minutes)?;

    let path = cfg
        .data_dir
        .join(ohlc::session_file_name(cfg.timeframe_minutes, &window.label()));
    csv_io::write_csv(&candles, &path)
        .with_context(|| format!("writing session file {}", path.display()))?;

    info!(
        session = %window.label(),
        rows = candles.len(),
        file = %path.display(),
        "session candles refreshed"
    );
    Ok(Some(path))
}

/// Poll until externally interrupted.
///
/// A failed pass is reported and retried at the next poll; snapshots arrive
/// all day, so a transient problem should not take the loop down.
pub fn run(cfg: &AggregatorConfig) {
    loop {
        match refresh_once(cfg, Local::now().time()) {
            Ok(Some(_)) => {}
            Ok(None) => debug!("outside every session window, waiting"),
            Err(e) => error!(error = %e, "refresh pass failed"),
        }
        std::thread::sleep(Duration::from_secs(cfg.poll_secs.max(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionWindow;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn cfg_for(dir: &std::path::Path) -> AggregatorConfig {
        AggregatorConfig {
            data_dir: dir.to_path_buf(),
            symbol_col: 0,
            price_col: 2,
            sessions: vec![SessionWindow::new("0900", "1000")],
            ..AggregatorConfig::default()
        }
    }

    #[test]
    fn idle_outside_all_windows() {
        let dir = tempfile::tempdir().unwrap();
        let result = refresh_once(&cfg_for(dir.path()), t(12, 0)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn in_session_overwrites_candle_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20260220_091500_board.csv"),
            "CK,Tran,Gia\nAAA,1,10.0\n",
        )
        .unwrap();

        let cfg = cfg_for(dir.path());
        let path = refresh_once(&cfg, t(9, 30)).unwrap().unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "OHLC_60min_0900-1000.csv"
        );
        let first = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first.lines().count(), 2);

        // a later snapshot extends the same candle on the next pass
        std::fs::write(
            dir.path().join("20260220_094500_board.csv"),
            "CK,Tran,Gia\nAAA,1,11.0\n",
        )
        .unwrap();
        refresh_once(&cfg, t(9, 31)).unwrap().unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(second.lines().count(), 2);
        assert!(second.contains("11.000000"));
    }

    #[test]
    fn empty_session_still_writes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = refresh_once(&cfg_for(dir.path()), t(9, 30)).unwrap().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "date,session,time,symbol,open,high,low,close");
    }
}
