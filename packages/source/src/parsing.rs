//! Shared parsing utilities for raw extract cells.
//!
//! Extracts arrive either as delimited text (every cell a string) or as
//! columnar files read back as text, so numbers may look like `"3"` or
//! `"3.0"` and blanks are common.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike as _};

/// Parses a non-negative count. Accepts integers and floats with no
/// fractional part. Returns `None` for anything else, including negative
/// values.
#[must_use]
pub fn parse_count(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return (n >= 0).then_some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= 9.0e15 {
        #[allow(clippy::cast_possible_truncation)] // range checked above
        return Some(f as i64);
    }
    None
}

/// Parses a finite coordinate value.
#[must_use]
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a date, ignoring any trailing input after the format matches
/// (so `"2019-05-02T00:00:00"` parses with `%Y-%m-%d`).
#[must_use]
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_and_remainder(raw.trim(), format)
        .ok()
        .map(|(date, _)| date)
}

/// Parses a clock time. When `raw` is a full timestamp matching `format`,
/// its time component is used.
#[must_use]
pub fn parse_time(raw: &str, format: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, format)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, format)
                .ok()
                .map(|dt| dt.time())
        })
}

/// Parses a combined date-time string with a single format.
#[must_use]
pub fn parse_date_time(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), format).ok()
}

/// Extracts the hour from a time string, trying each format in turn.
#[must_use]
pub fn parse_hour(raw: &str, formats: &[String]) -> Option<u32> {
    formats
        .iter()
        .find_map(|format| parse_time(raw, format))
        .map(|time| time.hour())
}

/// Normalizes a numeric `HHMM` time (`930`, `"930.0"`, `"1405"`) to four
/// digits. A missing time is treated as midnight.
#[must_use]
pub fn pad_hhmm(raw: Option<&str>) -> Option<String> {
    let Some(raw) = raw else {
        return Some("0000".to_string());
    };
    let value = parse_count(raw)?;
    let padded = format!("{value:04}");
    (padded.len() == 4).then_some(padded)
}

#[cfg(test)]
mod tests {
    use chrono::Datelike as _;

    use super::*;

    #[test]
    fn counts_accept_integral_floats() {
        assert_eq!(parse_count("3"), Some(3));
        assert_eq!(parse_count(" 3.0 "), Some(3));
        assert_eq!(parse_count("0"), Some(0));
    }

    #[test]
    fn counts_reject_garbage_and_negatives() {
        assert_eq!(parse_count("two"), None);
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_count("1.5"), None);
        assert_eq!(parse_count("NaN"), None);
    }

    #[test]
    fn date_ignores_trailing_time() {
        let date = parse_date("2019-05-02T00:00:00", "%Y-%m-%d").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2019, 5, 2));
    }

    #[test]
    fn time_falls_back_to_timestamp() {
        let time = parse_time("1899-12-30 14:35:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(time.hour(), 14);
        assert_eq!(parse_time("07:05:00", "%H:%M:%S").unwrap().hour(), 7);
    }

    #[test]
    fn hour_tries_formats_in_order() {
        let formats = vec!["%I:%M %p".to_string(), "%H:%M".to_string()];
        assert_eq!(parse_hour("08:15 pm", &formats), Some(20));
        assert_eq!(parse_hour("17:40", &formats), Some(17));
        assert_eq!(parse_hour("late", &formats), None);
    }

    #[test]
    fn hhmm_is_zero_padded() {
        assert_eq!(pad_hhmm(Some("930")).as_deref(), Some("0930"));
        assert_eq!(pad_hhmm(Some("1405.0")).as_deref(), Some("1405"));
        assert_eq!(pad_hhmm(None).as_deref(), Some("0000"));
        assert_eq!(pad_hhmm(Some("12345")), None);
        assert_eq!(pad_hhmm(Some("noon")), None);
    }

    #[test]
    fn combined_date_time() {
        let dt = parse_date_time(" 01/02/2015 13:05:00 ", "%d/%m/%Y %H:%M:%S").unwrap();
        assert_eq!(dt.month(), 2);
        assert_eq!(dt.hour(), 13);
    }
}
