use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;

/// Row type that knows its own output schema.
pub trait CsvRecord {
    fn headers() -> &'static [&'static str];
    fn record(&self) -> Vec<String>;
}

/// Write `records` to `path` with the type's header row first.
///
/// An empty slice still produces the header row, so consumers of the file
/// always see the full column schema.
pub fn write_csv<T: CsvRecord, P: AsRef<Path>>(records: &[T], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writer.write_record(T::headers())?;
    for record in records {
        writer.write_record(&record.record())?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
