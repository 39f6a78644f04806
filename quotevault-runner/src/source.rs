//! Data source trait and structured fetch errors.
//!
//! A `DataSource` turns an artifact's parameters into payload bytes. The
//! refresh workflow sits above this trait; sources know nothing about the
//! store or the calendar.

use crate::bars::PayloadError;
use quotevault_core::Parameters;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("source returned no data")]
    Empty,

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can produce payload bytes for an artifact.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Pull fresh bytes for the given parameters.
    fn pull(&self, parameters: &Parameters) -> Result<Vec<u8>, FetchError>;
}

/// Look up a required string parameter.
pub fn require_str<'a>(parameters: &'a Parameters, key: &str) -> Result<&'a str, FetchError> {
    parameters
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| FetchError::MissingParameter(key.to_string()))
}

/// Fixed response, for seeding and tests. Counts how often it was pulled.
pub struct StaticSource {
    name: String,
    response: Mutex<Result<Vec<u8>, String>>,
    pulls: AtomicUsize,
}

impl StaticSource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: "static".into(),
            response: Mutex::new(Ok(bytes.into())),
            pulls: AtomicUsize::new(0),
        }
    }

    /// A source whose every pull fails with `Unavailable(reason)`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            name: "static".into(),
            response: Mutex::new(Err(reason.into())),
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Change what later pulls return.
    pub fn set_response(&self, bytes: impl Into<Vec<u8>>) {
        *self.response.lock().unwrap_or_else(|e| e.into_inner()) = Ok(bytes.into());
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

impl DataSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&self, _parameters: &Parameters) -> Result<Vec<u8>, FetchError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        match &*self.response.lock().unwrap_or_else(|e| e.into_inner()) {
            Ok(bytes) => Ok(bytes.clone()),
            Err(reason) => Err(FetchError::Unavailable(reason.clone())),
        }
    }
}
