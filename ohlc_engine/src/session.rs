use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Intraday trading window, time-of-day only.
///
/// `start` and `end` are `HHMM` strings as they appear in configuration and
/// in output labels, e.g. `"0900"`/`"1000"`. Membership is half-open:
/// a tick belongs to the window when `start <= time < end`, regardless of
/// its calendar date. Windows crossing midnight are rejected by
/// [`validate_windows`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: String,
    pub end: String,
}

impl SessionWindow {
    pub fn new(start: &str, end: &str) -> Self {
        SessionWindow {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Label used in output rows and file names, e.g. `"0900-1000"`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// Parsed `(start, end)` times of day.
    pub fn bounds(&self) -> Result<(NaiveTime, NaiveTime)> {
        Ok((parse_hhmm(&self.start)?, parse_hhmm(&self.end)?))
    }

    /// Half-open membership test. An unparsable window matches nothing;
    /// configuration validation reports that case up front.
    pub fn contains(&self, time: NaiveTime) -> bool {
        match self.bounds() {
            Ok((start, end)) => time >= start && time < end,
            Err(_) => false,
        }
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        bail!("time of day must be 4 digits HHMM, got {s:?}");
    }
    NaiveTime::parse_from_str(s, "%H%M").with_context(|| format!("invalid time of day {s:?}"))
}

/// The fixed session table of the HOSE trading day.
pub fn default_windows() -> Vec<SessionWindow> {
    vec![
        SessionWindow::new("0900", "1000"),
        SessionWindow::new("1000", "1100"),
        SessionWindow::new("1100", "1130"),
        SessionWindow::new("1300", "1400"),
        SessionWindow::new("1400", "1430"),
    ]
}

/// Check that every window parses, runs forward within one day, and that no
/// two windows share a time-of-day instant. Gaps between windows are fine.
pub fn validate_windows(windows: &[SessionWindow]) -> Result<()> {
    let mut bounds = Vec::with_capacity(windows.len());
    for w in windows {
        let (start, end) = w
            .bounds()
            .with_context(|| format!("session window {}", w.label()))?;
        if start >= end {
            bail!("session window {} does not run forward", w.label());
        }
        bounds.push((start, end, w.label()));
    }
    for (i, a) in bounds.iter().enumerate() {
        for b in &bounds[i + 1..] {
            if a.0 < b.1 && b.0 < a.1 {
                bail!("session windows {} and {} overlap", a.2, b.2);
            }
        }
    }
    Ok(())
}

/// First window containing `now`, if any.
pub fn current_window<'a>(
    windows: &'a [SessionWindow],
    now: NaiveTime,
) -> Option<&'a SessionWindow> {
    windows.iter().find(|w| w.contains(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn label_joins_bounds() {
        assert_eq!(SessionWindow::new("0900", "1000").label(), "0900-1000");
    }

    #[test]
    fn membership_is_half_open() {
        let w = SessionWindow::new("0900", "1000");
        assert!(w.contains(t(9, 0)));
        assert!(w.contains(t(9, 59)));
        assert!(!w.contains(t(10, 0)));
        assert!(!w.contains(t(8, 59)));
    }

    #[test]
    fn default_table_is_valid() {
        validate_windows(&default_windows()).unwrap();
    }

    #[test]
    fn overlapping_windows_rejected() {
        let windows = vec![
            SessionWindow::new("0900", "1030"),
            SessionWindow::new("1000", "1100"),
        ];
        assert!(validate_windows(&windows).is_err());
    }

    #[test]
    fn backwards_window_rejected() {
        let windows = vec![SessionWindow::new("1400", "1300")];
        assert!(validate_windows(&windows).is_err());
    }

    #[test]
    fn garbage_window_rejected() {
        assert!(validate_windows(&[SessionWindow::new("9am", "10am")]).is_err());
        assert!(validate_windows(&[SessionWindow::new("900", "1000")]).is_err());
    }

    #[test]
    fn current_window_picks_first_match() {
        let windows = default_windows();
        assert_eq!(
            current_window(&windows, t(9, 30)).map(|w| w.label()),
            Some("0900-1000".to_string())
        );
        assert_eq!(
            current_window(&windows, t(14, 10)).map(|w| w.label()),
            Some("1400-1430".to_string())
        );
        assert!(current_window(&windows, t(12, 0)).is_none());
        assert!(current_window(&windows, t(20, 0)).is_none());
    }
}
