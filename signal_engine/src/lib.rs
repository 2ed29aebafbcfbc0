mod detector;

pub use crate::detector::{
    annotate, wick_metrics, write_signal_csv, DetectorConfig, SignalCandle, WickMetrics,
};
