//! Rule-based NYSE regular-session calendar.
//!
//! Sessions run 09:30–16:00 New York time, 13:00 on early-close days.
//! Holidays are derived from the exchange's observance rules rather than a
//! downloaded table, so the calendar works offline for its supported years.

use super::eastern::{last_weekday, local_date, nth_weekday, to_utc};
use super::{CalendarError, Session, TradingCalendar};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::collections::BTreeSet;

pub const FIRST_YEAR: i32 = 1990;
pub const LAST_YEAR: i32 = 2099;

/// Unscheduled closures (weather, national mourning, 9/11).
const SPECIAL_CLOSURES: &[(i32, u32, u32)] = &[
    (1994, 4, 27),
    (2001, 9, 11),
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),
    (2007, 1, 2),
    (2012, 10, 29),
    (2012, 10, 30),
    (2018, 12, 5),
    (2025, 1, 9),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayKind {
    Closed,
    Regular,
    EarlyClose,
}

#[derive(Debug, Clone, Default)]
pub struct NyseCalendar {
    extra_holidays: BTreeSet<NaiveDate>,
}

impl NyseCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additional full-day closures on top of the built-in rules.
    pub fn with_extra_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra_holidays.extend(dates);
        self
    }

    /// The session on `date`, or `None` for weekends and holidays.
    pub fn session_on(&self, date: NaiveDate) -> Result<Option<Session>, CalendarError> {
        self.check_year(date)?;
        let close_hour = match self.classify(date) {
            DayKind::Closed => return Ok(None),
            DayKind::Regular => 16,
            DayKind::EarlyClose => 13,
        };
        Ok(Some(Session::new(
            to_utc(date, hm(9, 30)),
            to_utc(date, hm(close_hour, 0)),
        )))
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.extra_holidays.contains(&date) || is_rule_holiday(date)
    }

    fn check_year(&self, date: NaiveDate) -> Result<(), CalendarError> {
        if (FIRST_YEAR..=LAST_YEAR).contains(&date.year()) {
            Ok(())
        } else {
            Err(CalendarError::OutOfRange {
                calendar: self.name().to_string(),
                date,
            })
        }
    }

    fn classify(&self, date: NaiveDate) -> DayKind {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || self.is_holiday(date) {
            DayKind::Closed
        } else if is_early_close(date) {
            DayKind::EarlyClose
        } else {
            DayKind::Regular
        }
    }
}

impl TradingCalendar for NyseCalendar {
    fn name(&self) -> &str {
        "NYSE"
    }

    fn schedule(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, CalendarError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let first = local_date(start);
        let last = local_date(end);
        self.check_year(first)?;
        self.check_year(last)?;

        let mut sessions = Vec::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            if let Some(session) = self.session_on(date)? {
                if session.overlaps(start, end) {
                    sessions.push(session);
                }
            }
        }
        Ok(sessions)
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

// ── Holiday rules ───────────────────────────────────────────────────

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Easter Sunday (anonymous Gregorian algorithm).
fn easter(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Full-day holidays observed in `year`.
fn holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    // New Year's Day: a Saturday holiday is not moved into the prior year.
    if let Some(jan1) = ymd(year, 1, 1) {
        if jan1.weekday() != Weekday::Sat {
            days.push(observed(jan1));
        }
    }
    if year >= 1998 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    days.extend(easter(year).map(|e| e - Duration::days(2)));
    days.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2022 {
        days.extend(ymd(year, 6, 19).map(observed));
    }
    days.extend(ymd(year, 7, 4).map(observed));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    days.extend(ymd(year, 12, 25).map(observed));

    days.extend(
        SPECIAL_CLOSURES
            .iter()
            .filter(|(y, _, _)| *y == year)
            .filter_map(|&(y, m, d)| ymd(y, m, d)),
    );
    days
}

fn is_rule_holiday(date: NaiveDate) -> bool {
    holidays(date.year()).contains(&date)
}

/// 13:00 closes: July 3, the day after Thanksgiving, Christmas Eve.
fn is_early_close(date: NaiveDate) -> bool {
    let weekday_before_holiday = matches!(
        date.weekday(),
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu
    );
    match (date.month(), date.day()) {
        (7, 3) | (12, 24) => weekday_before_holiday,
        _ => nth_weekday(date.year(), 11, Weekday::Thu, 4)
            .and_then(|t| t.succ_opt())
            .is_some_and(|friday| friday == date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn utc(y: i32, m: u32, day: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap()
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter(2024), Some(d(2024, 3, 31)));
        assert_eq!(easter(2025), Some(d(2025, 4, 20)));
        assert_eq!(easter(2000), Some(d(2000, 4, 23)));
    }

    #[test]
    fn holidays_2024() {
        let cal = NyseCalendar::new();
        for date in [
            d(2024, 1, 1),
            d(2024, 1, 15),
            d(2024, 2, 19),
            d(2024, 3, 29),
            d(2024, 5, 27),
            d(2024, 6, 19),
            d(2024, 7, 4),
            d(2024, 9, 2),
            d(2024, 11, 28),
            d(2024, 12, 25),
        ] {
            assert_eq!(cal.session_on(date).unwrap(), None, "{date} should be closed");
        }
    }

    #[test]
    fn observance_shifts() {
        let cal = NyseCalendar::new();
        // July 4, 2026 is a Saturday: observed Friday July 3.
        assert_eq!(cal.session_on(d(2026, 7, 3)).unwrap(), None);
        // Christmas 2022 is a Sunday: observed Monday Dec 26.
        assert_eq!(cal.session_on(d(2022, 12, 26)).unwrap(), None);
        // New Year's 2022 is a Saturday: Friday Dec 31, 2021 still trades.
        assert!(cal.session_on(d(2021, 12, 31)).unwrap().is_some());
        // Juneteenth was not a market holiday before 2022.
        assert!(cal.session_on(d(2021, 6, 18)).unwrap().is_some());
    }

    #[test]
    fn early_closes() {
        let cal = NyseCalendar::new();
        let black_friday = cal.session_on(d(2024, 11, 29)).unwrap().unwrap();
        assert_eq!(black_friday.close, utc(2024, 11, 29, 18, 0));

        let christmas_eve = cal.session_on(d(2024, 12, 24)).unwrap().unwrap();
        assert_eq!(christmas_eve.close, utc(2024, 12, 24, 18, 0));

        let july_3 = cal.session_on(d(2024, 7, 3)).unwrap().unwrap();
        assert_eq!(july_3.close, utc(2024, 7, 3, 17, 0));
    }

    #[test]
    fn regular_session_times_follow_dst() {
        let cal = NyseCalendar::new();
        let winter = cal.session_on(d(2024, 1, 2)).unwrap().unwrap();
        assert_eq!(winter, Session::new(utc(2024, 1, 2, 14, 30), utc(2024, 1, 2, 21, 0)));
        let summer = cal.session_on(d(2024, 7, 1)).unwrap().unwrap();
        assert_eq!(summer, Session::new(utc(2024, 7, 1, 13, 30), utc(2024, 7, 1, 20, 0)));
    }

    #[test]
    fn schedule_over_a_week() {
        let cal = NyseCalendar::new();
        // Mon 2024-01-01 (holiday) through Sun 2024-01-07.
        let sessions = cal
            .schedule(utc(2024, 1, 1, 0, 0), utc(2024, 1, 8, 0, 0))
            .unwrap();
        assert_eq!(sessions.len(), 4);
        assert_eq!(sessions[0].open, utc(2024, 1, 2, 14, 30));
        assert!(sessions.windows(2).all(|w| w[0].close < w[1].open));
    }

    #[test]
    fn is_open_at_respects_session_bounds() {
        let cal = NyseCalendar::new();
        assert!(cal.is_open_at(utc(2024, 1, 2, 14, 30)).unwrap());
        assert!(cal.is_open_at(utc(2024, 1, 2, 20, 59)).unwrap());
        assert!(!cal.is_open_at(utc(2024, 1, 2, 21, 0)).unwrap());
        assert!(!cal.is_open_at(utc(2024, 1, 6, 15, 0)).unwrap());
    }

    #[test]
    fn extra_holidays_close_the_market() {
        let cal = NyseCalendar::new().with_extra_holidays([d(2024, 1, 3)]);
        assert_eq!(cal.session_on(d(2024, 1, 3)).unwrap(), None);
        assert!(cal.session_on(d(2024, 1, 2)).unwrap().is_some());
    }

    #[test]
    fn unsupported_years_are_out_of_range() {
        let cal = NyseCalendar::new();
        assert!(matches!(
            cal.session_on(d(1985, 1, 2)),
            Err(CalendarError::OutOfRange { .. })
        ));
        assert!(matches!(
            cal.schedule(utc(2100, 1, 2, 0, 0), utc(2100, 1, 3, 0, 0)),
            Err(CalendarError::OutOfRange { .. })
        ));
    }

    #[test]
    fn special_closures_are_holidays() {
        let cal = NyseCalendar::new();
        assert_eq!(cal.session_on(d(2012, 10, 29)).unwrap(), None);
        assert_eq!(cal.session_on(d(2001, 9, 11)).unwrap(), None);
    }
}
