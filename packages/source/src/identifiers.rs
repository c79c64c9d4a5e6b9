//! Deterministic composite keys for the shared dimension tables.
//!
//! Keys are pure functions of their record's content so that identical
//! dimension rows collapse to one after deduplication. They are short
//! human-readable summaries, not hashes.

use crash_etl_crash_models::VehicleType;

/// Builds the `vehicles_id` from the 18 vehicle counts given in
/// [`VehicleType::all`] order.
///
/// Each type with a positive count contributes `{count}{code}`; zero
/// counts contribute nothing. Counts of `{car_sedan: 2, bus: 1}` give
/// `"2c1B"`.
#[must_use]
pub fn vehicles_id(counts: &[i64; VehicleType::COUNT]) -> String {
    VehicleType::all()
        .iter()
        .zip(counts)
        .filter(|(_, count)| **count > 0)
        .map(|(vehicle, count)| format!("{count}{}", vehicle.code()))
        .collect()
}

/// Builds the `casualties_id`.
///
/// The total is always emitted (`"0c"` for a crash without casualties),
/// followed by fatalities (`f`), serious injuries (`s`) and minor injuries
/// (`m`) when positive. A missing breakdown count is treated as absent.
#[must_use]
pub fn casualties_id(
    casualties: i64,
    fatalities: Option<i64>,
    serious_injuries: Option<i64>,
    minor_injuries: Option<i64>,
) -> String {
    let mut id = format!("{casualties}c");
    for (count, code) in [
        (fatalities, 'f'),
        (serious_injuries, 's'),
        (minor_injuries, 'm'),
    ] {
        if let Some(count) = count.filter(|c| *c > 0) {
            id.push_str(&count.to_string());
            id.push(code);
        }
    }
    id
}

/// The calendar components a `date_time_id` is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DateTimeParts {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day_of_month: Option<i64>,
    /// ISO weekday, Monday = 1.
    pub day_of_week: Option<i64>,
    pub hour: Option<i64>,
}

/// Builds `{year}-{month}-{day_of_month}-{day_of_week}-{hour}`.
///
/// Missing components render as empty strings, so a record with only a
/// year gives `"2019----"`.
#[must_use]
pub fn date_time_id(parts: &DateTimeParts) -> String {
    [
        parts.year,
        parts.month,
        parts.day_of_month,
        parts.day_of_week,
        parts.hour,
    ]
    .iter()
    .map(|part| part.map(|v| v.to_string()).unwrap_or_default())
    .collect::<Vec<_>>()
    .join("-")
}
