//! CSV data source.
//!
//! Reads daily bars from `date,open,high,low,close,volume[,adj_close]` files
//! (Yahoo-style capitalized headers are accepted too), validates them, and
//! encodes them as the bar payload.
//!
//! Parameters consulted:
//! - `path`: explicit file, overrides everything else
//! - `symbol`: file `{dir}/{SYMBOL}.csv` when the source is a directory
//! - `start`, `end`: optional inclusive `YYYY-MM-DD` date filter

use crate::bars::{encode_bars, Bar};
use crate::source::{require_str, DataSource, FetchError};
use chrono::NaiveDate;
use quotevault_core::Parameters;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
    #[serde(default, alias = "Adj Close", alias = "adj close")]
    adj_close: Option<f64>,
}

impl From<CsvRow> for Bar {
    fn from(row: CsvRow) -> Self {
        Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.max(0.0).round() as u64,
            adj_close: row.adj_close,
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    Directory(PathBuf),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CsvSource {
    location: Location,
}

impl CsvSource {
    /// One `{SYMBOL}.csv` per symbol under `dir`.
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(dir.into()),
        }
    }

    /// A single file, whatever the symbol.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
        }
    }

    fn resolve_path(&self, parameters: &Parameters) -> Result<PathBuf, FetchError> {
        if let Some(path) = parameters.get("path").and_then(|v| v.as_str()) {
            return Ok(PathBuf::from(path));
        }
        match &self.location {
            Location::File(path) => Ok(path.clone()),
            Location::Directory(dir) => {
                let symbol = require_str(parameters, "symbol")?;
                Ok(dir.join(format!("{}.csv", symbol.to_ascii_uppercase())))
            }
        }
    }

    /// Read, sort, and filter bars from `path`.
    pub fn read_bars(
        path: &Path,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| FetchError::Csv(format!("{}: {e}", path.display())))?;

        let mut bars = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| FetchError::Csv(format!("{} row {}: {e}", path.display(), line + 1)))?;
            if start.is_some_and(|s| row.date < s) || end.is_some_and(|e| row.date > e) {
                continue;
            }
            bars.push(Bar::from(row));
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

fn date_param(parameters: &Parameters, key: &str) -> Result<Option<NaiveDate>, FetchError> {
    match parameters.get(key).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| FetchError::Csv(format!("parameter '{key}' is not a date: {e}"))),
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn pull(&self, parameters: &Parameters) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve_path(parameters)?;
        if !path.exists() {
            let symbol = parameters
                .get("symbol")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(if symbol.is_empty() {
                FetchError::Unavailable(format!("{} does not exist", path.display()))
            } else {
                FetchError::SymbolNotFound { symbol }
            });
        }

        let start = date_param(parameters, "start")?;
        let end = date_param(parameters, "end")?;
        let bars = Self::read_bars(&path, start, end)?;
        if bars.is_empty() {
            return Err(FetchError::Empty);
        }
        tracing::debug!(path = %path.display(), bars = bars.len(), "read CSV bars");
        Ok(encode_bars(&bars)?)
    }
}
