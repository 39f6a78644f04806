//! Calendar backed by an explicit session list.
//!
//! TOML shape:
//!
//! ```toml
//! name = "desk"
//! coverage = { start = "2024-01-01", end = "2024-12-31" }  # optional
//!
//! [[sessions]]
//! open = "2024-01-02T14:30:00Z"
//! close = "2024-01-02T21:00:00Z"
//! ```

use super::{CalendarError, Session, TradingCalendar};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Coverage {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct FixedCalendarFile {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    coverage: Option<Coverage>,
    #[serde(default)]
    sessions: Vec<Session>,
}

fn default_name() -> String {
    "fixed".into()
}

/// Sessions given up front. Without a coverage window every range is
/// answerable; ranges outside a declared window are `OutOfRange`.
#[derive(Debug, Clone)]
pub struct FixedCalendar {
    name: String,
    sessions: Vec<Session>,
    coverage: Option<Coverage>,
}

impl FixedCalendar {
    /// Build from sessions in any order. Sessions must be non-empty and
    /// must not overlap.
    pub fn new(name: impl Into<String>, mut sessions: Vec<Session>) -> Result<Self, CalendarError> {
        sessions.sort();
        for s in &sessions {
            if s.close <= s.open {
                return Err(CalendarError::InvalidSession {
                    open: s.open,
                    close: s.close,
                });
            }
        }
        for pair in sessions.windows(2) {
            if pair[1].open < pair[0].close {
                return Err(CalendarError::Overlap(pair[1].open));
            }
        }
        Ok(Self {
            name: name.into(),
            sessions,
            coverage: None,
        })
    }

    pub fn with_coverage(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.coverage = Some(Coverage { start, end });
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CalendarError> {
        let file: FixedCalendarFile =
            toml::from_str(content).map_err(|e| CalendarError::Definition(e.to_string()))?;
        let mut calendar = Self::new(file.name, file.sessions)?;
        calendar.coverage = file.coverage;
        Ok(calendar)
    }

    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::Definition(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    fn check_coverage(&self, instant: DateTime<Utc>) -> Result<(), CalendarError> {
        let Some(coverage) = self.coverage else {
            return Ok(());
        };
        let date = instant.date_naive();
        if date < coverage.start || date > coverage.end {
            return Err(CalendarError::OutOfRange {
                calendar: self.name.clone(),
                date,
            });
        }
        Ok(())
    }
}

impl TradingCalendar for FixedCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, CalendarError> {
        if end <= start {
            return Ok(Vec::new());
        }
        self.check_coverage(start)?;
        self.check_coverage(end)?;
        // Sessions are sorted and disjoint, so closes are sorted too.
        let first = self.sessions.partition_point(|s| s.close <= start);
        Ok(self.sessions[first..]
            .iter()
            .take_while(|s| s.open < end)
            .copied()
            .collect())
    }
}
