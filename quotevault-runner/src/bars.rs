//! Bar payload codec.
//!
//! The store treats payloads as opaque bytes; bar series are encoded as a
//! versioned JSON document so any reader can decode them without this crate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload format version written by [`encode_bars`].
pub const PAYLOAD_VERSION: u32 = 1;

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BarPayload {
    payload_version: u32,
    bars: Vec<Bar>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported payload version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("bar {index} ({date}) is invalid: {reason}")]
    InvalidBar {
        index: usize,
        date: NaiveDate,
        reason: String,
    },

    #[error("no bars")]
    Empty,
}

/// Check that prices are finite and positive, `low <= open/close <= high`,
/// and dates strictly ascend.
pub fn validate_bars(bars: &[Bar]) -> Result<(), PayloadError> {
    if bars.is_empty() {
        return Err(PayloadError::Empty);
    }
    let invalid = |index: usize, bar: &Bar, reason: String| PayloadError::InvalidBar {
        index,
        date: bar.date,
        reason,
    };

    for (i, bar) in bars.iter().enumerate() {
        for (label, price) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !price.is_finite() || price <= 0.0 {
                return Err(invalid(i, bar, format!("{label} price {price} is not positive")));
            }
        }
        if bar.low > bar.high {
            return Err(invalid(i, bar, format!("low {} above high {}", bar.low, bar.high)));
        }
        if bar.open < bar.low || bar.open > bar.high || bar.close < bar.low || bar.close > bar.high
        {
            return Err(invalid(i, bar, "open/close outside the high-low range".into()));
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(invalid(i, bar, format!("date not after {}", bars[i - 1].date)));
        }
    }
    Ok(())
}

/// Validate and encode bars as the JSON payload.
pub fn encode_bars(bars: &[Bar]) -> Result<Vec<u8>, PayloadError> {
    validate_bars(bars)?;
    let payload = BarPayload {
        payload_version: PAYLOAD_VERSION,
        bars: bars.to_vec(),
    };
    Ok(serde_json::to_vec(&payload)?)
}

/// Decode a payload written by [`encode_bars`].
pub fn decode_bars(bytes: &[u8]) -> Result<Vec<Bar>, PayloadError> {
    let payload: BarPayload = serde_json::from_slice(bytes)?;
    if payload.payload_version > PAYLOAD_VERSION {
        return Err(PayloadError::UnsupportedVersion {
            found: payload.payload_version,
            supported: PAYLOAD_VERSION,
        });
    }
    Ok(payload.bars)
}
