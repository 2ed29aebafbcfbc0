use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime, Timelike};

use crate::csv_io::CsvRecord;
use crate::session::SessionWindow;
use crate::tick::Tick;

/// Name of the merged all-sessions candle file.
pub const MERGED_FILE: &str = "ohlc.csv";

/// One OHLC bar for a symbol inside one timeframe bucket of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub date: String,
    pub session: String,
    pub time: NaiveDateTime,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl CsvRecord for Candle {
    fn headers() -> &'static [&'static str] {
        &["date", "session", "time", "symbol", "open", "high", "low", "close"]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.session.clone(),
            self.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.symbol.clone(),
            format!("{:.6}", self.open),
            format!("{:.6}", self.high),
            format!("{:.6}", self.low),
            format!("{:.6}", self.close),
        ]
    }
}

/// Output order: (date, session, bucket time, symbol).
pub fn candle_order(a: &Candle, b: &Candle) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.session.cmp(&b.session))
        .then_with(|| a.time.cmp(&b.time))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

/// Per-session candle file name, e.g. `OHLC_60min_0900-1000.csv`.
pub fn session_file_name(timeframe_minutes: u32, label: &str) -> String {
    format!("OHLC_{timeframe_minutes}min_{label}.csv")
}

/// Start of the fixed-width bucket containing `ts`.
///
/// Buckets are anchored to midnight of the tick's own calendar day, so
/// boundaries are reproducible across runs and never depend on the first
/// tick seen.
pub fn bucket_start(ts: NaiveDateTime, timeframe_minutes: u32) -> NaiveDateTime {
    let width = timeframe_minutes.max(1) * 60;
    let secs = ts.time().num_seconds_from_midnight();
    let start = secs - secs % width;
    ts.date().and_time(
        NaiveTime::from_num_seconds_from_midnight_opt(start, 0).unwrap_or(NaiveTime::MIN),
    )
}

struct BucketAcc {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    first: NaiveDateTime,
    last: NaiveDateTime,
}

/// Candles for one session window.
///
/// Keeps ticks whose time-of-day falls inside the window, buckets them per
/// symbol and calendar day, and folds each bucket into open/high/low/close.
/// Buckets with no ticks produce nothing.
pub fn aggregate_session(
    ticks: &[Tick],
    window: &SessionWindow,
    timeframe_minutes: u32,
) -> Result<Vec<Candle>> {
    let (start, end) = window.bounds()?;
    let label = window.label();

    let mut buckets: HashMap<(String, NaiveDateTime), BucketAcc> = HashMap::new();
    for tick in ticks {
        let tod = tick.time.time();
        if tod < start || tod >= end {
            continue;
        }
        let bucket = bucket_start(tick.time, timeframe_minutes);
        match buckets.get_mut(&(tick.symbol.clone(), bucket)) {
            Some(acc) => {
                if tick.price > acc.high {
                    acc.high = tick.price;
                }
                if tick.price < acc.low {
                    acc.low = tick.price;
                }
                if tick.time < acc.first {
                    acc.first = tick.time;
                    acc.open = tick.price;
                }
                if tick.time >= acc.last {
                    acc.last = tick.time;
                    acc.close = tick.price;
                }
            }
            None => {
                buckets.insert(
                    (tick.symbol.clone(), bucket),
                    BucketAcc {
                        open: tick.price,
                        high: tick.price,
                        low: tick.price,
                        close: tick.price,
                        first: tick.time,
                        last: tick.time,
                    },
                );
            }
        }
    }

    let mut candles: Vec<Candle> = buckets
        .into_iter()
        .map(|((symbol, bucket), acc)| Candle {
            date: bucket.format("%Y%m%d").to_string(),
            session: label.clone(),
            time: bucket,
            symbol,
            open: acc.open,
            high: acc.high,
            low: acc.low,
            close: acc.close,
        })
        .collect();
    candles.sort_by(candle_order);
    Ok(candles)
}

/// Concatenation of every session's candles in output order.
pub fn aggregate_all(
    ticks: &[Tick],
    windows: &[SessionWindow],
    timeframe_minutes: u32,
) -> Result<Vec<Candle>> {
    let mut all = Vec::new();
    for window in windows {
        all.extend(aggregate_session(ticks, window, timeframe_minutes)?);
    }
    all.sort_by(candle_order);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn tick(symbol: &str, time: NaiveDateTime, price: f64) -> Tick {
        Tick {
            time,
            symbol: symbol.to_string(),
            price,
        }
    }

    fn sorted(mut ticks: Vec<Tick>) -> Vec<Tick> {
        ticks.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.time.cmp(&b.time)));
        ticks
    }

    #[test]
    fn bucket_anchored_to_midnight() {
        assert_eq!(bucket_start(ts(20, 9, 15), 60), ts(20, 9, 0));
        assert_eq!(bucket_start(ts(20, 9, 59), 60), ts(20, 9, 0));
        assert_eq!(bucket_start(ts(20, 11, 7), 15), ts(20, 11, 0));
        assert_eq!(bucket_start(ts(20, 14, 29), 30), ts(20, 14, 0));
        assert_eq!(bucket_start(ts(20, 0, 0), 60), ts(20, 0, 0));
    }

    #[test]
    fn single_bucket_worked_example() {
        // AAA: 09:15 @ 10.0, 09:40 @ 9.0, 09:55 @ 10.5 inside 0900-1000
        let ticks = sorted(vec![
            tick("AAA", ts(20, 9, 15), 10.0),
            tick("AAA", ts(20, 9, 40), 9.0),
            tick("AAA", ts(20, 9, 55), 10.5),
        ]);
        let window = SessionWindow::new("0900", "1000");

        let candles = aggregate_session(&ticks, &window, 60).unwrap();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.date, "20260220");
        assert_eq!(c.session, "0900-1000");
        assert_eq!(c.time, ts(20, 9, 0));
        assert_eq!(c.symbol, "AAA");
        assert_eq!((c.open, c.high, c.low, c.close), (10.0, 10.5, 9.0, 10.5));
    }

    #[test]
    fn ohlc_invariants_hold() {
        let prices = [12.0, 11.4, 13.2, 12.8, 11.9, 12.1];
        let ticks = sorted(
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| tick("AAA", ts(20, 9, i as u32 * 5), *p))
                .collect(),
        );
        let window = SessionWindow::new("0900", "1000");

        let candles = aggregate_session(&ticks, &window, 60).unwrap();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open, 12.0);
        assert_eq!(c.close, 12.1);
        assert_eq!(c.high, 13.2);
        assert_eq!(c.low, 11.4);
        assert!(c.low <= c.open && c.open <= c.high);
        assert!(c.low <= c.close && c.close <= c.high);
    }

    #[test]
    fn out_of_window_ticks_contribute_nothing() {
        let ticks = sorted(vec![
            tick("AAA", ts(20, 8, 59), 10.0),
            tick("AAA", ts(20, 10, 0), 11.0),
            tick("AAA", ts(20, 12, 0), 12.0),
        ]);
        let window = SessionWindow::new("0900", "1000");

        let candles = aggregate_session(&ticks, &window, 60).unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn windows_repeat_across_days() {
        let ticks = sorted(vec![
            tick("AAA", ts(20, 9, 10), 10.0),
            tick("AAA", ts(23, 9, 10), 20.0),
        ]);
        let window = SessionWindow::new("0900", "1000");

        let candles = aggregate_session(&ticks, &window, 60).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, "20260220");
        assert_eq!(candles[1].date, "20260223");
    }

    #[test]
    fn sub_hour_timeframe_splits_session() {
        let ticks = sorted(vec![
            tick("AAA", ts(20, 9, 5), 10.0),
            tick("AAA", ts(20, 9, 25), 10.6),
            tick("AAA", ts(20, 9, 35), 9.8),
        ]);
        let window = SessionWindow::new("0900", "1000");

        let candles = aggregate_session(&ticks, &window, 30).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, ts(20, 9, 0));
        assert_eq!((candles[0].open, candles[0].close), (10.0, 10.6));
        assert_eq!(candles[1].time, ts(20, 9, 30));
        assert_eq!((candles[1].open, candles[1].close), (9.8, 9.8));
    }

    #[test]
    fn aggregate_all_keeps_output_order() {
        let ticks = sorted(vec![
            tick("BBB", ts(20, 9, 10), 20.0),
            tick("AAA", ts(20, 9, 10), 10.0),
            tick("AAA", ts(20, 10, 10), 11.0),
        ]);
        let windows = vec![
            SessionWindow::new("0900", "1000"),
            SessionWindow::new("1000", "1100"),
        ];

        let all = aggregate_all(&ticks, &windows, 60).unwrap();
        let keys: Vec<(&str, &str, &str)> = all
            .iter()
            .map(|c| (c.date.as_str(), c.session.as_str(), c.symbol.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("20260220", "0900-1000", "AAA"),
                ("20260220", "0900-1000", "BBB"),
                ("20260220", "1000-1100", "AAA"),
            ]
        );
    }

    #[test]
    fn record_matches_schema() {
        let c = Candle {
            date: "20260220".to_string(),
            session: "0900-1000".to_string(),
            time: ts(20, 9, 0),
            symbol: "AAA".to_string(),
            open: 10.0,
            high: 10.5,
            low: 9.0,
            close: 10.5,
        };
        let row = c.record();
        assert_eq!(row.len(), Candle::headers().len());
        assert_eq!(row[2], "2026-02-20 09:00:00");
        assert_eq!(row[4], "10.000000");
    }
}
