//! America/New_York wall-clock conversion.
//!
//! US daylight saving rules:
//! - 2007 onward: second Sunday of March 02:00 to first Sunday of November 02:00
//! - 1987-2006: first Sunday of April 02:00 to last Sunday of October 02:00
//!
//! Only the years the calendars support are handled; earlier years use the
//! 1987 rule.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};

const STANDARD_OFFSET_HOURS: i64 = 5;
const DAYLIGHT_OFFSET_HOURS: i64 = 4;

/// The `n`-th (1-based) `weekday` of `month`.
pub(crate) fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// The last `weekday` of `month`.
pub(crate) fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Local dates on which DST starts and ends in `year`.
fn dst_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    if year >= 2007 {
        Some((
            nth_weekday(year, 3, Weekday::Sun, 2)?,
            nth_weekday(year, 11, Weekday::Sun, 1)?,
        ))
    } else {
        Some((
            nth_weekday(year, 4, Weekday::Sun, 1)?,
            last_weekday(year, 10, Weekday::Sun)?,
        ))
    }
}

/// Whether daylight time is in effect at local wall time `local`.
///
/// Ambiguous and skipped hours around 02:00 never occur during trading
/// hours, so they resolve to whichever side the date comparison lands on.
fn is_daylight(local: NaiveDateTime) -> bool {
    let Some((start, end)) = dst_bounds(local.date().year()) else {
        return false;
    };
    let two_am = NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN);
    local >= start.and_time(two_am) && local < end.and_time(two_am)
}

/// UTC offset (hours west of UTC) for a New York wall time.
fn offset_hours(local: NaiveDateTime) -> i64 {
    if is_daylight(local) {
        DAYLIGHT_OFFSET_HOURS
    } else {
        STANDARD_OFFSET_HOURS
    }
}

/// Convert a New York wall time on `date` to a UTC instant.
pub fn to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let local = date.and_time(time);
    Utc.from_utc_datetime(&(local + Duration::hours(offset_hours(local))))
}

/// The New York calendar date containing `instant`.
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    let naive = instant.naive_utc();
    // Try daylight first; it is correct whenever the shifted wall time is in DST.
    let daylight = naive - Duration::hours(DAYLIGHT_OFFSET_HOURS);
    if is_daylight(daylight) {
        daylight.date()
    } else {
        (naive - Duration::hours(STANDARD_OFFSET_HOURS)).date()
    }
}
