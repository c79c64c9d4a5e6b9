//! The canonical staging schema and the six output table projections.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Storage type of a staging column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    /// `true`, `false` or an explicit `unknown`.
    TriState,
    LatLong,
}

impl ColumnKind {
    /// SQL type used for columnar output.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::Text | Self::TriState | Self::LatLong => "VARCHAR",
        }
    }
}

/// A named, typed staging column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

/// Every column of a harmonised crash record, in canonical order.
pub const CANONICAL_FIELDS: &[Column] = &[
    col("crash_id", ColumnKind::Text),
    col("lat_long", ColumnKind::LatLong),
    col("date_time_id", ColumnKind::Text),
    col("description_id", ColumnKind::Integer),
    col("vehicles_id", ColumnKind::Text),
    col("casualties_id", ColumnKind::Text),
    col("latitude", ColumnKind::Float),
    col("longitude", ColumnKind::Float),
    col("country", ColumnKind::Text),
    col("state", ColumnKind::Text),
    col("local_government_area", ColumnKind::Text),
    col("statistical_area", ColumnKind::Text),
    col("suburb", ColumnKind::Text),
    col("year", ColumnKind::Integer),
    col("month", ColumnKind::Integer),
    col("day_of_week", ColumnKind::Integer),
    col("day_of_month", ColumnKind::Integer),
    col("hour", ColumnKind::Integer),
    col("approximate", ColumnKind::Boolean),
    col("animals", ColumnKind::Integer),
    col("car_sedan", ColumnKind::Integer),
    col("car_utility", ColumnKind::Integer),
    col("car_van", ColumnKind::Integer),
    col("car_4x4", ColumnKind::Integer),
    col("car_station_wagon", ColumnKind::Integer),
    col("motor_cycle", ColumnKind::Integer),
    col("truck_small", ColumnKind::Integer),
    col("truck_large", ColumnKind::Integer),
    col("bus", ColumnKind::Integer),
    col("taxi", ColumnKind::Integer),
    col("bicycle", ColumnKind::Integer),
    col("scooter", ColumnKind::Integer),
    col("pedestrian", ColumnKind::Integer),
    col("inanimate", ColumnKind::Integer),
    col("train", ColumnKind::Integer),
    col("tram", ColumnKind::Integer),
    col("vehicle_other", ColumnKind::Integer),
    col("casualties", ColumnKind::Integer),
    col("fatalities", ColumnKind::Integer),
    col("serious_injuries", ColumnKind::Integer),
    col("minor_injuries", ColumnKind::Integer),
    col("severity", ColumnKind::Text),
    col("speed_limit", ColumnKind::Text),
    col("midblock", ColumnKind::Boolean),
    col("intersection", ColumnKind::Boolean),
    col("road_position_horizontal", ColumnKind::Text),
    col("road_position_vertical", ColumnKind::Text),
    col("road_sealed", ColumnKind::TriState),
    col("road_wet", ColumnKind::TriState),
    col("weather", ColumnKind::Text),
    col("crash_type", ColumnKind::Text),
    col("lighting", ColumnKind::Text),
    col("traffic_controls", ColumnKind::Text),
    col("drugs_alcohol", ColumnKind::Text),
    col("DCA_code", ColumnKind::Text),
    col("comment", ColumnKind::Text),
];

/// Names of [`CANONICAL_FIELDS`] in canonical order.
#[must_use]
pub fn canonical_field_names() -> Vec<&'static str> {
    CANONICAL_FIELDS.iter().map(|c| c.name).collect()
}

/// Looks up a canonical column by name.
#[must_use]
pub fn canonical_column(name: &str) -> Option<Column> {
    CANONICAL_FIELDS.iter().copied().find(|c| c.name == name)
}

/// The 18 vehicle count columns, in canonical order.
pub const VEHICLE_FIELDS: &[&str] = &[
    "animals",
    "car_sedan",
    "car_utility",
    "car_van",
    "car_4x4",
    "car_station_wagon",
    "motor_cycle",
    "truck_small",
    "truck_large",
    "bus",
    "taxi",
    "bicycle",
    "scooter",
    "pedestrian",
    "inanimate",
    "train",
    "tram",
    "vehicle_other",
];

const CRASH_FIELDS: &[&str] = &[
    "crash_id",
    "lat_long",
    "date_time_id",
    "description_id",
    "vehicles_id",
    "casualties_id",
];

const LOCATION_FIELDS: &[&str] = &[
    "lat_long",
    "latitude",
    "longitude",
    "country",
    "state",
    "local_government_area",
    "statistical_area",
    "suburb",
];

const DATE_TIME_FIELDS: &[&str] = &[
    "date_time_id",
    "year",
    "month",
    "day_of_week",
    "day_of_month",
    "hour",
    "approximate",
];

const VEHICLES_TABLE_FIELDS: &[&str] = &[
    "vehicles_id",
    "animals",
    "car_sedan",
    "car_utility",
    "car_van",
    "car_4x4",
    "car_station_wagon",
    "motor_cycle",
    "truck_small",
    "truck_large",
    "bus",
    "taxi",
    "bicycle",
    "scooter",
    "pedestrian",
    "inanimate",
    "train",
    "tram",
    "vehicle_other",
];

const CASUALTIES_FIELDS: &[&str] = &[
    "casualties_id",
    "casualties",
    "fatalities",
    "serious_injuries",
    "minor_injuries",
];

const DESCRIPTION_FIELDS: &[&str] = &[
    "description_id",
    "severity",
    "speed_limit",
    "midblock",
    "intersection",
    "road_position_horizontal",
    "road_position_vertical",
    "road_sealed",
    "road_wet",
    "weather",
    "crash_type",
    "lighting",
    "traffic_controls",
    "drugs_alcohol",
    "DCA_code",
    "comment",
];

/// One of the six normalized staging tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum OutputTable {
    Crash,
    Description,
    DateTime,
    Casualties,
    Location,
    Vehicles,
}

impl OutputTable {
    /// Returns every output table in write order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Crash,
            Self::Description,
            Self::DateTime,
            Self::Casualties,
            Self::Location,
            Self::Vehicles,
        ]
    }

    /// Column names of this table, key first.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Crash => CRASH_FIELDS,
            Self::Description => DESCRIPTION_FIELDS,
            Self::DateTime => DATE_TIME_FIELDS,
            Self::Casualties => CASUALTIES_FIELDS,
            Self::Location => LOCATION_FIELDS,
            Self::Vehicles => VEHICLES_TABLE_FIELDS,
        }
    }

    /// The key column of this table.
    #[must_use]
    pub const fn key(self) -> &'static str {
        self.fields()[0]
    }

    /// Whether the key is a content-derived dimension key, meaning several
    /// crashes may share one row after deduplication.
    #[must_use]
    pub const fn is_shared_dimension(self) -> bool {
        !matches!(self, Self::Crash | Self::Description)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crash_etl_crash_models::VehicleType;

    use super::*;

    #[test]
    fn canonical_names_are_unique() {
        let names: BTreeSet<&str> = CANONICAL_FIELDS.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CANONICAL_FIELDS.len());
    }

    #[test]
    fn vehicle_fields_follow_vehicle_type_order() {
        let from_enum: Vec<&str> = VehicleType::all().iter().map(AsRef::as_ref).collect();
        assert_eq!(VEHICLE_FIELDS, from_enum.as_slice());
        assert_eq!(&OutputTable::Vehicles.fields()[1..], VEHICLE_FIELDS);
    }

    #[test]
    fn every_output_field_is_canonical() {
        for table in OutputTable::all() {
            for field in table.fields() {
                assert!(canonical_column(field).is_some(), "{table}: {field}");
            }
        }
    }

    #[test]
    fn output_tables_cover_the_canonical_schema() {
        let covered: BTreeSet<&str> = OutputTable::all()
            .iter()
            .flat_map(|t| t.fields().iter().copied())
            .collect();
        let canonical: BTreeSet<&str> = canonical_field_names().into_iter().collect();
        assert_eq!(covered, canonical);
    }

    #[test]
    fn keys_come_first() {
        assert_eq!(OutputTable::Crash.key(), "crash_id");
        assert_eq!(OutputTable::Location.key(), "lat_long");
        assert_eq!(OutputTable::Description.key(), "description_id");
        assert!(!OutputTable::Description.is_shared_dimension());
        assert!(OutputTable::Vehicles.is_shared_dimension());
    }
}
