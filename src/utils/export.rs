//! export.rs
//! CSV export of captured time series.
//!
//! One row per sample: `time_ms, value, name, units`. Measurement metadata is
//! taken from the capture's start snapshot, so every row of a file agrees.

use csv::Writer;
use serde::Serialize;
use std::{
    fs::{create_dir_all, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};
use log::{error, info};

use crate::time_series::TimeSeries;

#[derive(Serialize)]
struct CsvRow<'a> {
    time_ms: u64,
    value: f64,
    name: &'a str,
    units: &'a str,
}

/// Writes `series` to `dir/file_name`, creating `dir` when missing.
pub fn export_time_series_csv(
    series: &TimeSeries,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf, csv::Error> {
    if let Err(e) = create_dir_all(dir) {
        error!("Failed to create export directory {}: {}", dir.display(), e);
        return Err(e.into());
    }
    let path = dir.join(file_name);
    let file = File::create(&path)?;
    write_time_series(series, BufWriter::new(file))?;
    info!("exported {} samples to {}", series.len(), path.display());
    Ok(path)
}

pub fn write_time_series<W: io::Write>(series: &TimeSeries, out: W) -> Result<(), csv::Error> {
    let info = series.info();
    let mut wtr = Writer::from_writer(out);
    for sample in &series.samples {
        wtr.serialize(CsvRow {
            time_ms: sample.time_ms,
            value: sample.value,
            name: &info.name,
            units: &info.units,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
