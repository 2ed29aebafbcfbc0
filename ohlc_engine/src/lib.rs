pub mod config;
pub mod csv_io;
pub mod history;
pub mod ohlc;
pub mod refresh;
pub mod session;
pub mod tick;

pub use crate::config::AggregatorConfig;
pub use crate::csv_io::CsvRecord;
pub use crate::ohlc::Candle;
pub use crate::session::SessionWindow;
pub use crate::tick::Tick;
