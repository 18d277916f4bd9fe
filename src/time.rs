//! Wall-clock instants in local time.
//!
//! Scheduled start times are defined as a time of day and anchored to a
//! date (the load date, or today after a reset). All comparisons are made on
//! the anchored local date-time.

use std::fmt;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{CoordinatorError, Result};

const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOG_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(NaiveDateTime);

impl Time {
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    pub fn on_date(date: NaiveDate, time_of_day: NaiveTime) -> Self {
        Self(date.and_time(time_of_day))
    }

    /// Today's date at the given time of day.
    pub fn today_at(time_of_day: NaiveTime) -> Self {
        Self::on_date(Local::now().date_naive(), time_of_day)
    }

    /// Parse an `HH:mm:ss` time of day.
    pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
        let invalid = || CoordinatorError::InvalidTime(value.to_string());
        let parts: Vec<&str> = value.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut fields = [0u32; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            *field = part.trim().parse().map_err(|_| invalid())?;
        }
        NaiveTime::from_hms_opt(fields[0], fields[1], fields[2]).ok_or_else(invalid)
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.0.time()
    }

    /// Same hour, minute and second, moved to today's date.
    pub fn reanchored_today(&self) -> Self {
        let time = self.0.time();
        let time = time.with_nanosecond(0).unwrap_or(time);
        Self::today_at(time)
    }

    pub fn plus_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + Duration::seconds(seconds))
    }

    pub fn is_before(&self, other: &Time) -> bool {
        self.0 < other.0
    }

    pub fn same_or_after(&self, other: &Time) -> bool {
        self.0 >= other.0
    }

    /// Signed milliseconds from `self` until `later`.
    pub fn millis_until(&self, later: &Time) -> i64 {
        later.0.signed_duration_since(self.0).num_milliseconds()
    }

    pub fn format_time(&self) -> String {
        self.0.format(TIME_FORMAT).to_string()
    }

    pub fn format_datetime(&self) -> String {
        self.0.format(DATETIME_FORMAT).to_string()
    }

    /// Compact stamp used in per-run log file names.
    pub fn log_stamp(&self) -> String {
        self.0.format(LOG_STAMP_FORMAT).to_string()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_datetime())
    }
}

/// Human readable elapsed time, truncated to its largest unit.
pub fn describe_elapsed(millis: i64) -> String {
    let seconds = millis.max(0) / 1000;
    match seconds {
        s if s < 60 => format!("{} seconds", s),
        s if s < 3_600 => format!("{} minute(s)", s / 60),
        s if s < 86_400 => format!("{} hour(s)", s / 3_600),
        s => format!("{} day(s)", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_of_day_accepts_hh_mm_ss() {
        let t = Time::parse_time_of_day("07:30:05").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(7, 30, 5).unwrap());
    }

    #[test]
    fn parse_time_of_day_rejects_bad_input() {
        assert!(Time::parse_time_of_day("07:30").is_err());
        assert!(Time::parse_time_of_day("25:00:00").is_err());
        assert!(Time::parse_time_of_day("aa:bb:cc").is_err());
        assert!(Time::parse_time_of_day("").is_err());
    }

    #[test]
    fn reanchor_keeps_time_of_day() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        let time = NaiveTime::from_hms_opt(23, 1, 2).unwrap();
        let old = Time::on_date(date, time);
        let moved = old.reanchored_today();
        assert_eq!(moved.time_of_day(), time);
        assert_eq!(moved.naive().date(), Local::now().date_naive());
    }

    #[test]
    fn ordering_and_deltas() {
        let base = Time::now();
        let later = base.plus_seconds(90);
        assert!(base.is_before(&later));
        assert!(later.same_or_after(&base));
        assert!(base.same_or_after(&base));
        assert_eq!(base.millis_until(&later), 90_000);
        assert_eq!(later.millis_until(&base), -90_000);
    }

    #[test]
    fn formatting() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let t = Time::on_date(date, NaiveTime::from_hms_opt(9, 8, 7).unwrap());
        assert_eq!(t.format_time(), "09:08:07");
        assert_eq!(t.format_datetime(), "2024-01-05 09:08:07");
        assert_eq!(t.log_stamp(), "20240105090807");
        assert_eq!(t.to_string(), "2024-01-05 09:08:07");
    }

    #[test]
    fn elapsed_descriptions() {
        assert_eq!(describe_elapsed(59_999), "59 seconds");
        assert_eq!(describe_elapsed(60_000), "1 minute(s)");
        assert_eq!(describe_elapsed(7_200_000), "2 hour(s)");
        assert_eq!(describe_elapsed(90_000_000), "1 day(s)");
        assert_eq!(describe_elapsed(-5), "0 seconds");
    }
}
