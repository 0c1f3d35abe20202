//! Calendar helpers for daily rate publication.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::error::RatesError;

/// Format of configured cutoff times.
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Format of normalized record dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `hh:mm:ss` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, RatesError> {
    NaiveTime::parse_from_str(value.trim(), TIME_OF_DAY_FORMAT).map_err(|_| {
        RatesError::Configuration(format!(
            "wrong time {:?}, write it in format hh:mm:ss",
            value
        ))
    })
}

/// Check if a date falls on Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The closest business day on or before `date`.
pub fn business_day_on_or_before(date: NaiveDate) -> NaiveDate {
    let mut day = date;
    while is_weekend(day) {
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    day
}

/// The cutoff instant governing `now`.
///
/// On a business day this is that day's cutoff. On a weekend it carries back
/// to the preceding Friday's cutoff, which has always already passed.
pub fn effective_cutoff(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    business_day_on_or_before(now.date()).and_time(cutoff)
}

/// Format a date the way records store it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, time: &str) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(parse_time_of_day(time).unwrap())
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("18:00:00").unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_time_of_day("18:00"),
            Err(RatesError::Configuration(_))
        ));
        assert!(parse_time_of_day("25:00:00").is_err());
    }

    #[test]
    fn test_weekday_cutoff_is_same_day() {
        // 2024-01-10 is a Wednesday.
        let cutoff = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert_eq!(
            effective_cutoff(at(2024, 1, 10, "09:00:00"), cutoff),
            at(2024, 1, 10, "18:00:00")
        );
    }

    #[test]
    fn test_weekend_cutoff_carries_back_to_friday() {
        // 2024-01-13 is a Saturday, 2024-01-14 a Sunday.
        let cutoff = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        let friday = at(2024, 1, 12, "18:00:00");

        assert_eq!(effective_cutoff(at(2024, 1, 13, "10:00:00"), cutoff), friday);
        assert_eq!(effective_cutoff(at(2024, 1, 14, "23:59:59"), cutoff), friday);
    }

    #[test]
    fn test_business_day_on_or_before() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let friday = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();

        assert_eq!(business_day_on_or_before(monday), monday);
        assert_eq!(business_day_on_or_before(sunday), friday);
        assert!(is_weekend(sunday));
        assert!(!is_weekend(monday));
        assert_eq!(format_date(friday), "2024-01-12");
    }
}
