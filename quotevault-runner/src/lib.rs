//! QuoteVault Runner — refresh orchestration on top of `quotevault-core`.
//!
//! This crate provides:
//! - The `DataSource` trait with CSV and static implementations
//! - The JSON bar payload codec
//! - Series keys mapping (symbol, interval) to artifact names
//! - The refresh workflow (check → fetch → write) with per-name locks
//! - Parallel batch refresh with a summary
//! - Deployment configuration

pub mod bars;
pub mod batch;
pub mod config;
pub mod csv_source;
pub mod locks;
pub mod refresh;
pub mod series;
pub mod source;

pub use bars::{decode_bars, encode_bars, Bar, PayloadError};
pub use batch::{refresh_many, refresh_many_at, BatchOptions, BatchProgress, BatchSummary, NoProgress};
pub use config::{CalendarKind, ConfigError, VaultConfig};
pub use csv_source::CsvSource;
pub use locks::ArtifactLocks;
pub use refresh::{ArtifactStatus, Origin, RefreshError, RefreshWorkflow, Refreshed};
pub use series::{Interval, SeriesKey};
pub use source::{DataSource, FetchError, StaticSource};
