//! Trading calendars.
//!
//! A calendar answers two questions: which sessions fall in a range, and
//! whether the market is open at an instant. Implementations:
//! - [`NyseCalendar`]: rule-based NYSE regular sessions
//! - [`FixedCalendar`]: an explicit session list, typically loaded from TOML

pub mod eastern;
pub mod fixed;
pub mod nyse;

pub use fixed::FixedCalendar;
pub use nyse::NyseCalendar;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One trading session, `[open, close)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Session {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl Session {
    pub fn new(open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        Self { open, close }
    }

    /// Open inclusive, close exclusive.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.open <= instant && instant < self.close
    }

    /// Whether the session overlaps the half-open range `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.open < end && self.close > start
    }

    pub fn duration(&self) -> Duration {
        self.close - self.open
    }
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar '{calendar}' has no data for {date}")]
    OutOfRange { calendar: String, date: NaiveDate },

    #[error("invalid session {open} → {close}: close must be after open")]
    InvalidSession {
        open: DateTime<Utc>,
        close: DateTime<Utc>,
    },

    #[error("sessions overlap at {0}")]
    Overlap(DateTime<Utc>),

    #[error("calendar definition error: {0}")]
    Definition(String),
}

/// Source of trading sessions. Read-only; shared across threads.
pub trait TradingCalendar: Send + Sync {
    /// Human-readable calendar name.
    fn name(&self) -> &str;

    /// Sessions overlapping `[start, end)`, ascending. Empty when none.
    fn schedule(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, CalendarError>;

    /// Whether a session is in progress at `instant`.
    fn is_open_at(&self, instant: DateTime<Utc>) -> Result<bool, CalendarError> {
        let sessions = self.schedule(instant - Duration::days(1), instant + Duration::seconds(1))?;
        Ok(sessions.iter().any(|s| s.contains(instant)))
    }
}

/// How far back [`latest_session`] searches.
const LOOKBACK_DAYS: i64 = 10;

/// The most recent session that opened at or before `now`.
///
/// Returns `None` if no session opened within the lookback window.
pub fn latest_session(
    calendar: &dyn TradingCalendar,
    now: DateTime<Utc>,
) -> Result<Option<Session>, CalendarError> {
    let sessions = calendar.schedule(now - Duration::days(LOOKBACK_DAYS), now + Duration::seconds(1))?;
    Ok(sessions.into_iter().rev().find(|s| s.open <= now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    #[test]
    fn session_bounds_are_half_open() {
        let s = Session::new(at(2, 14, 30), at(2, 21, 0));
        assert!(s.contains(at(2, 14, 30)));
        assert!(!s.contains(at(2, 21, 0)));
        assert!(s.overlaps(at(2, 20, 59), at(3, 0, 0)));
        assert!(!s.overlaps(at(2, 21, 0), at(3, 0, 0)));
        assert!(!s.overlaps(at(1, 0, 0), at(2, 14, 30)));
        assert_eq!(s.duration(), Duration::minutes(390));
    }

    #[test]
    fn latest_session_picks_most_recent_opened() {
        let cal = FixedCalendar::new(
            "test",
            vec![
                Session::new(at(2, 14, 30), at(2, 21, 0)),
                Session::new(at(3, 14, 30), at(3, 21, 0)),
            ],
        )
        .unwrap();

        assert_eq!(latest_session(&cal, at(3, 10, 0)).unwrap().unwrap().open, at(2, 14, 30));
        assert_eq!(latest_session(&cal, at(3, 14, 30)).unwrap().unwrap().open, at(3, 14, 30));
        assert_eq!(latest_session(&cal, at(1, 0, 0)).unwrap(), None);
    }
}
