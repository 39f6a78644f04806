//! Series keys: the mapping from (symbol, interval) to an artifact name.

use quotevault_core::Parameters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Intraday,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Intraday => "intraday",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "1d" => Ok(Interval::Daily),
            "intraday" | "1m" => Ok(Interval::Intraday),
            other => Err(format!("unknown interval '{other}' (expected daily or intraday)")),
        }
    }
}

/// A symbol at an interval. Symbols are normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    symbol: String,
    interval: Interval,
}

impl SeriesKey {
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            interval,
        }
    }

    pub fn daily(symbol: &str) -> Self {
        Self::new(symbol, Interval::Daily)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// `"{SYMBOL}_{interval}"`, e.g. `AAA_daily`.
    pub fn artifact_name(&self) -> String {
        format!("{}_{}", self.symbol, self.interval)
    }

    /// Inverse of [`artifact_name`](Self::artifact_name). Splits on the last
    /// underscore so symbols may contain underscores themselves.
    pub fn from_artifact_name(name: &str) -> Option<Self> {
        let (symbol, interval) = name.rsplit_once('_')?;
        if symbol.is_empty() {
            return None;
        }
        Some(Self::new(symbol, interval.parse().ok()?))
    }

    /// Parameters a data source needs to pull this series.
    pub fn parameters(&self) -> Parameters {
        Parameters::from([
            ("symbol".to_string(), Value::from(self.symbol.clone())),
            ("interval".to_string(), Value::from(self.interval.as_str())),
        ])
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.artifact_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names() {
        assert_eq!(SeriesKey::daily("aaa").artifact_name(), "AAA_daily");
        assert_eq!(
            SeriesKey::new(" spy ", Interval::Intraday).artifact_name(),
            "SPY_intraday"
        );
    }

    #[test]
    fn parse_back_from_artifact_name() {
        let key = SeriesKey::from_artifact_name("BRK_B_daily").unwrap();
        assert_eq!(key.symbol(), "BRK_B");
        assert_eq!(key.interval(), Interval::Daily);
        assert_eq!(SeriesKey::from_artifact_name("notes"), None);
        assert_eq!(SeriesKey::from_artifact_name("_daily"), None);
        assert_eq!(SeriesKey::from_artifact_name("AAA_weekly"), None);
    }

    #[test]
    fn interval_parsing() {
        assert_eq!("Daily".parse::<Interval>().unwrap(), Interval::Daily);
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::Intraday);
        assert!("weekly".parse::<Interval>().is_err());
    }

    #[test]
    fn parameters_carry_symbol_and_interval() {
        let params = SeriesKey::daily("aaa").parameters();
        assert_eq!(params["symbol"], "AAA");
        assert_eq!(params["interval"], "daily");
    }
}
