//! Freshness oracle: may a cached copy refreshed at `last` be reused at `now`?
//!
//! Rules, first match wins:
//! 1. never refreshed → stale
//! 2. market open at `now` → stale
//! 3. a session open or close in `(last, now]` → stale
//! 4. otherwise fresh

use crate::calendar::{CalendarError, TradingCalendar};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    NeverRefreshed,
    MarketOpen,
    /// The earliest boundary that invalidated the cached copy.
    BoundaryCrossed { at: DateTime<Utc> },
    Fresh,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::NeverRefreshed => f.write_str("never refreshed"),
            Freshness::MarketOpen => f.write_str("market open"),
            Freshness::BoundaryCrossed { at } => write!(f, "session boundary at {at}"),
            Freshness::Fresh => f.write_str("fresh"),
        }
    }
}

#[derive(Clone)]
pub struct FreshnessOracle {
    calendar: Arc<dyn TradingCalendar>,
}

impl FreshnessOracle {
    pub fn new(calendar: Arc<dyn TradingCalendar>) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &dyn TradingCalendar {
        self.calendar.as_ref()
    }

    pub fn is_fresh(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, CalendarError> {
        Ok(self.classify(last, now)?.is_fresh())
    }

    pub fn classify(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Freshness, CalendarError> {
        let Some(last) = last else {
            return Ok(Freshness::NeverRefreshed);
        };
        if self.calendar.is_open_at(now)? {
            return Ok(Freshness::MarketOpen);
        }
        if last >= now {
            return Ok(Freshness::Fresh);
        }

        // `end` is exclusive; widen by a second so a boundary exactly at `now` counts.
        let sessions = self.calendar.schedule(last, now + Duration::seconds(1))?;
        let crossed = sessions
            .iter()
            .flat_map(|s| [s.open, s.close])
            .find(|b| last < *b && *b <= now);
        Ok(match crossed {
            Some(at) => Freshness::BoundaryCrossed { at },
            None => Freshness::Fresh,
        })
    }
}
