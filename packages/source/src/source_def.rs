//! Config-driven jurisdiction definition.
//!
//! [`JurisdictionDefinition`] captures everything that differs between the
//! six sources: where the extracts live, which raw columns feed which
//! canonical bucket, and which dictionary applies to which raw column. One
//! generic pipeline ([`crate::harmonise`]) runs every definition.

use std::collections::BTreeMap;

use crash_etl_crash_models::{Jurisdiction, VehicleType};
use crash_etl_source_models::{Table, Value};
use serde::Deserialize;

use crate::error::DefinitionError;
use crate::projection::ProjectionName;
use crate::vocabulary::DictionaryField;

// ── Top-level definition ─────────────────────────────────────────────────

/// A complete, config-driven jurisdiction definition.
#[derive(Debug, Clone, Deserialize)]
pub struct JurisdictionDefinition {
    pub id: Jurisdiction,
    /// Human-readable name (e.g. `"South Australia"`).
    pub name: String,
    /// Native row identifier column, prefixed to form `crash_id`.
    pub row_id: String,
    pub extract: ExtractConfig,
    /// Grid-to-geographic projection, for sources without lat/long.
    pub projection: Option<ProjectionConfig>,
    /// Vehicle bucket mapping. `None` when the source has no vehicle data,
    /// in which case every vehicle field stays missing.
    pub vehicles: Option<VehicleMapping>,
    /// Casualty mapping. `None` when the source has no casualty data.
    pub casualties: Option<CasualtyMapping>,
    #[serde(default)]
    pub description: DescriptionMapping,
    pub date_time: DateTimeStrategy,
    #[serde(default)]
    pub location: LocationMapping,
}

impl JurisdictionDefinition {
    /// Every raw column this definition reads, in first-use order.
    ///
    /// Used to detect upstream schema drift before harmonisation.
    #[must_use]
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns: Vec<&str> = vec![self.row_id.as_str()];

        if let Some(projection) = &self.projection {
            columns.extend([projection.x.as_str(), projection.y.as_str()]);
        }
        if let Some(vehicles) = &self.vehicles {
            columns.extend(vehicles.columns());
        }
        if let Some(casualties) = &self.casualties {
            columns.extend(casualties.columns());
        }
        columns.extend(self.description.columns());
        columns.extend(self.date_time.columns());
        columns.extend(self.location.columns());

        let mut seen = Vec::with_capacity(columns.len());
        for column in columns {
            // Derived by the projection stage, not read from the extract.
            if matches!(column, "calc_lat" | "calc_long") {
                continue;
            }
            if !seen.iter().any(|c: &String| c == column) {
                seen.push(column.to_string());
            }
        }
        seen
    }
}

// ── Extract config ───────────────────────────────────────────────────────

/// File format of an extract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractFormat {
    /// Delimited text with a header row.
    #[default]
    Csv,
    /// A directory of Parquet part files.
    Parquet,
}

/// Inclusive range of years substituted into `{year}` path templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn iter(self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

/// Where a jurisdiction's raw data lives, relative to the store's base
/// path.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    #[serde(default)]
    pub format: ExtractFormat,
    /// Primary crash file (or directory, for Parquet). May contain
    /// `{year}`.
    pub path: String,
    /// Years to expand `{year}` over. Without a range the path is used
    /// as-is.
    pub years: Option<YearRange>,
    /// Lookup files left-joined on a key column.
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
    /// Unit files counted per category and widened onto the crash rows.
    #[serde(default)]
    pub pivots: Vec<PivotConfig>,
}

impl ExtractConfig {
    /// Expands a path template over the configured years.
    #[must_use]
    pub fn expand(&self, template: &str) -> Vec<String> {
        match self.years {
            Some(years) if template.contains("{year}") => years
                .iter()
                .map(|year| template.replace("{year}", &year.to_string()))
                .collect(),
            _ => vec![template.to_string()],
        }
    }
}

/// A delimited lookup table left-joined onto the crash rows.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    pub path: String,
    pub key: String,
}

/// A unit-level table summarised to one count column per category.
#[derive(Debug, Clone, Deserialize)]
pub struct PivotConfig {
    pub path: String,
    /// Column linking units to crashes.
    pub key: String,
    /// Column whose distinct values become count columns.
    pub category: String,
}

// ── Projection ───────────────────────────────────────────────────────────

/// Grid coordinate columns and the projection they are recorded in.
///
/// The projected coordinates land in `calc_lat` and `calc_long`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    pub name: ProjectionName,
    pub x: String,
    pub y: String,
}

// ── Vehicles ─────────────────────────────────────────────────────────────

/// Raw columns summed into each canonical vehicle bucket.
///
/// Written in TOML as a table from bucket name to column list:
///
/// ```toml
/// [vehicles]
/// car_sedan = ["Motor Cars - Sedan"]
/// bus = ["OMNIBUS"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<String>>")]
pub struct VehicleMapping {
    buckets: BTreeMap<VehicleType, Vec<String>>,
}

impl TryFrom<BTreeMap<String, Vec<String>>> for VehicleMapping {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut buckets = BTreeMap::new();
        for (name, columns) in raw {
            let vehicle: VehicleType = name
                .parse()
                .map_err(|_| format!("unknown vehicle bucket {name:?}"))?;
            buckets.insert(vehicle, columns);
        }
        Ok(Self { buckets })
    }
}

impl VehicleMapping {
    /// Source columns for `vehicle`; `None` if the source has no column
    /// for that bucket.
    #[must_use]
    pub fn columns_for(&self, vehicle: VehicleType) -> Option<&[String]> {
        self.buckets
            .get(&vehicle)
            .map(Vec::as_slice)
            .filter(|c| !c.is_empty())
    }

    fn columns(&self) -> impl Iterator<Item = &str> {
        self.buckets.values().flatten().map(String::as_str)
    }
}

// ── Casualties ───────────────────────────────────────────────────────────

/// Raw columns summed into each casualty count.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CasualtyMapping {
    /// Total casualties. When absent the total is the sum of the three
    /// breakdown counts.
    pub casualties: Option<Vec<String>>,
    #[serde(default)]
    pub fatalities: Vec<String>,
    #[serde(default)]
    pub serious_injuries: Vec<String>,
    #[serde(default)]
    pub minor_injuries: Vec<String>,
}

impl CasualtyMapping {
    fn columns(&self) -> impl Iterator<Item = &str> {
        self.casualties
            .iter()
            .flatten()
            .chain(&self.fatalities)
            .chain(&self.serious_injuries)
            .chain(&self.minor_injuries)
            .map(String::as_str)
    }
}

// ── Description ──────────────────────────────────────────────────────────

/// A raw column mapped through a vocabulary dictionary.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "LookupFieldDef")]
pub struct LookupField {
    pub field: String,
    /// Raw term substituted for missing cells before the lookup.
    pub missing: Option<String>,
    /// Reads the column as a flag instead: true exactly when the raw term
    /// equals this, false for anything else including missing cells. No
    /// dictionary is consulted.
    pub equals: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LookupFieldDef {
    Column(String),
    Full {
        field: String,
        missing: Option<String>,
        equals: Option<String>,
    },
}

impl From<LookupFieldDef> for LookupField {
    fn from(def: LookupFieldDef) -> Self {
        match def {
            LookupFieldDef::Column(field) => Self {
                field,
                missing: None,
                equals: None,
            },
            LookupFieldDef::Full {
                field,
                missing,
                equals,
            } => Self {
                field,
                missing,
                equals,
            },
        }
    }
}

impl LookupField {
    /// The raw term for `row`, with the missing-value default applied.
    #[must_use]
    pub fn raw(&self, table: &Table, row: usize) -> Option<String> {
        table
            .get(row, &self.field)
            .as_raw()
            .or_else(|| self.missing.clone())
    }

    /// The flag value for `row` when this field is configured with
    /// `equals`.
    #[must_use]
    pub fn flag(&self, table: &Table, row: usize) -> Option<bool> {
        let expected = self.equals.as_deref()?;
        Some(self.raw(table, row).as_deref() == Some(expected))
    }
}

/// How to build a free-text canonical field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextExtractor {
    /// Copy a single column.
    Single(String),
    /// Join several columns with a separator. Missing when any part is
    /// missing.
    Combine {
        fields: Vec<String>,
        separator: String,
    },
}

impl TextExtractor {
    #[must_use]
    pub fn extract(&self, table: &Table, row: usize) -> Value {
        match self {
            Self::Single(field) => table.get(row, field).as_raw().map_or(Value::Null, Value::Text),
            Self::Combine { fields, separator } => {
                let parts: Option<Vec<String>> =
                    fields.iter().map(|f| table.get(row, f).as_raw()).collect();
                parts.map_or(Value::Null, |parts| Value::text(parts.join(separator)))
            }
        }
    }

    fn columns(&self) -> Vec<&str> {
        match self {
            Self::Single(field) => vec![field.as_str()],
            Self::Combine { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }
}

/// Dictionary-backed and free-text description fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionMapping {
    pub severity: Option<LookupField>,
    /// Feeds `midblock`; `intersection` is always its negation.
    pub midblock: Option<LookupField>,
    pub road_position_horizontal: Option<LookupField>,
    pub road_position_vertical: Option<LookupField>,
    pub road_sealed: Option<LookupField>,
    pub road_wet: Option<LookupField>,
    pub weather: Option<LookupField>,
    pub lighting: Option<LookupField>,
    pub traffic_controls: Option<LookupField>,
    pub speed_limit: Option<TextExtractor>,
    pub crash_type: Option<TextExtractor>,
    pub drugs_alcohol: Option<TextExtractor>,
    #[serde(rename = "DCA_code")]
    pub dca_code: Option<TextExtractor>,
    pub comment: Option<TextExtractor>,
}

impl DescriptionMapping {
    /// The configured lookups, paired with the dictionary each uses.
    #[must_use]
    pub fn lookups(&self) -> Vec<(DictionaryField, &LookupField)> {
        use DictionaryField as F;

        [
            (F::Severity, &self.severity),
            (F::Midblock, &self.midblock),
            (F::RoadPositionHorizontal, &self.road_position_horizontal),
            (F::RoadPositionVertical, &self.road_position_vertical),
            (F::RoadSealed, &self.road_sealed),
            (F::RoadWet, &self.road_wet),
            (F::Weather, &self.weather),
            (F::Lighting, &self.lighting),
            (F::TrafficControls, &self.traffic_controls),
        ]
        .into_iter()
        .filter_map(|(field, lookup)| lookup.as_ref().map(|l| (field, l)))
        .collect()
    }

    /// The configured free-text fields with their canonical names.
    #[must_use]
    pub fn texts(&self) -> Vec<(&'static str, &TextExtractor)> {
        [
            ("speed_limit", &self.speed_limit),
            ("crash_type", &self.crash_type),
            ("drugs_alcohol", &self.drugs_alcohol),
            ("DCA_code", &self.dca_code),
            ("comment", &self.comment),
        ]
        .into_iter()
        .filter_map(|(name, text)| text.as_ref().map(|t| (name, t)))
        .collect()
    }

    fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .lookups()
            .into_iter()
            .map(|(_, l)| l.field.as_str())
            .collect();
        for (_, text) in self.texts() {
            columns.extend(text.columns());
        }
        columns
    }
}

// ── Date/time ────────────────────────────────────────────────────────────

/// Where the hour comes from in a coded date.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HourSource {
    /// An integer hour column (0-23).
    Number { field: String },
    /// A time string column, parsed with the first matching format.
    TimeString { field: String, formats: Vec<String> },
}

impl HourSource {
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Number { field } | Self::TimeString { field, .. } => field,
        }
    }
}

/// How to assemble the calendar fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DateTimeStrategy {
    /// Separately coded year, month name, weekday name and hour. There is
    /// no day of month, so the result is always approximate.
    Coded {
        year: String,
        month: Option<LookupField>,
        day_of_week: Option<LookupField>,
        hour: Option<HourSource>,
    },
    /// Date and time columns joined with a space and parsed with one
    /// format.
    Combined {
        date: String,
        time: String,
        format: String,
    },
    /// A date column plus a numeric `HHMM` time column. Missing times are
    /// read as midnight.
    DatePlusHhmm {
        date: String,
        time: String,
        date_format: String,
    },
    /// Date and time columns parsed with their own formats. Trailing input
    /// after the date is ignored.
    Separate {
        date: String,
        date_format: String,
        time: String,
        time_format: String,
    },
}

impl DateTimeStrategy {
    fn columns(&self) -> Vec<&str> {
        match self {
            Self::Coded {
                year,
                month,
                day_of_week,
                hour,
            } => {
                let mut columns = vec![year.as_str()];
                columns.extend(month.iter().map(|m| m.field.as_str()));
                columns.extend(day_of_week.iter().map(|d| d.field.as_str()));
                columns.extend(hour.iter().map(HourSource::field));
                columns
            }
            Self::Combined { date, time, .. }
            | Self::DatePlusHhmm { date, time, .. }
            | Self::Separate { date, time, .. } => vec![date.as_str(), time.as_str()],
        }
    }
}

// ── Location ─────────────────────────────────────────────────────────────

/// The coordinate pair forming the `lat_long` key.
#[derive(Debug, Clone, Deserialize)]
pub struct LatLongColumns {
    pub latitude: String,
    pub longitude: String,
}

/// Location columns. `country` and `state` come from the jurisdiction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationMapping {
    pub lat_long: Option<LatLongColumns>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub local_government_area: Option<String>,
    pub statistical_area: Option<String>,
    pub suburb: Option<String>,
}

impl LocationMapping {
    fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        if let Some(pair) = &self.lat_long {
            columns.extend([pair.latitude.as_str(), pair.longitude.as_str()]);
        }
        columns.extend(
            [
                &self.latitude,
                &self.longitude,
                &self.local_government_area,
                &self.statistical_area,
                &self.suburb,
            ]
            .into_iter()
            .flatten()
            .map(String::as_str),
        );
        columns
    }
}

/// Parses a jurisdiction definition from TOML.
///
/// # Errors
///
/// Returns [`DefinitionError::Parse`] if the definition is malformed.
pub fn parse_jurisdiction_toml(toml_str: &str) -> Result<JurisdictionDefinition, DefinitionError> {
    Ok(toml::de::from_str(toml_str)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        id = "wa"
        name = "Western Australia"
        row_id = "ACC_ID"

        [extract]
        format = "parquet"
        path = "crash_wa/crash"

        [vehicles]
        motor_cycle = ["TOTAL_MOTOR_CYCLE_INVOLVED"]
        truck_large = ["TOTAL_HEAVY_TRUCK_INVOLVED"]

        [description]
        severity = "SEVERITY"
        midblock = { field = "ACCIDENT_TYPE", missing = "Unknown" }
        crash_type = { fields = ["EVENT_NATURE", "EVENT_TYPE"], separator = " " }

        [date_time]
        type = "date_plus_hhmm"
        date = "CRASH_DATE"
        time = "CRASH_TIME"
        date_format = "%d/%m/%Y"

        [location]
        lat_long = { latitude = "LATITUDE", longitude = "LONGITUDE" }
        longitude = "LONGITUDE"
    "#;

    #[test]
    fn parses_minimal_definition() {
        let def = parse_jurisdiction_toml(MINIMAL).unwrap();
        assert_eq!(def.id, Jurisdiction::Wa);
        assert_eq!(def.extract.format, ExtractFormat::Parquet);
        assert!(def.casualties.is_none());
        assert!(matches!(def.date_time, DateTimeStrategy::DatePlusHhmm { .. }));

        let vehicles = def.vehicles.as_ref().unwrap();
        assert_eq!(
            vehicles.columns_for(VehicleType::MotorCycle),
            Some(["TOTAL_MOTOR_CYCLE_INVOLVED".to_string()].as_slice())
        );
        assert_eq!(vehicles.columns_for(VehicleType::Bus), None);

        let midblock = def.description.midblock.as_ref().unwrap();
        assert_eq!(midblock.missing.as_deref(), Some("Unknown"));
        assert!(def.description.severity.as_ref().unwrap().missing.is_none());
    }

    #[test]
    fn rejects_unknown_vehicle_bucket() {
        let toml = MINIMAL.replace("motor_cycle =", "hovercraft =");
        let err = parse_jurisdiction_toml(&toml).unwrap_err().to_string();
        assert!(err.contains("hovercraft"), "{err}");
    }

    #[test]
    fn referenced_columns_are_deduplicated_in_order() {
        let def = parse_jurisdiction_toml(MINIMAL).unwrap();
        let columns = def.referenced_columns();
        assert_eq!(columns[0], "ACC_ID");
        assert_eq!(
            columns.iter().filter(|c| c.as_str() == "LONGITUDE").count(),
            1
        );
        assert!(columns.iter().any(|c| c == "EVENT_TYPE"));
        assert!(columns.iter().any(|c| c == "CRASH_TIME"));
    }

    #[test]
    fn expands_year_templates() {
        let extract = ExtractConfig {
            format: ExtractFormat::Csv,
            path: "crash_sa/road-crash-data-{year}/{year}_DATA_SA_Crash.csv".to_string(),
            years: Some(YearRange {
                start: 2017,
                end: 2018,
            }),
            joins: Vec::new(),
            pivots: Vec::new(),
        };
        assert_eq!(
            extract.expand(&extract.path),
            vec![
                "crash_sa/road-crash-data-2017/2017_DATA_SA_Crash.csv",
                "crash_sa/road-crash-data-2018/2018_DATA_SA_Crash.csv",
            ]
        );
        assert_eq!(extract.expand("crash_vic/NODE.csv"), vec!["crash_vic/NODE.csv"]);
    }

    #[test]
    fn text_extractors() {
        let mut table = Table::new(&["EVENT_NATURE", "EVENT_TYPE", "SPEED"]);
        table.push_row(vec![
            Value::text("Rear End"),
            Value::Null,
            Value::text(" 60 "),
        ]);
        let combine = TextExtractor::Combine {
            fields: vec!["EVENT_NATURE".to_string(), "EVENT_TYPE".to_string()],
            separator: " ".to_string(),
        };
        assert_eq!(combine.extract(&table, 0), Value::Null);
        table.push_row(vec![
            Value::text("Rear End"),
            Value::text("Vehicle"),
            Value::Null,
        ]);
        assert_eq!(combine.extract(&table, 1), Value::text("Rear End Vehicle"));
        assert_eq!(
            TextExtractor::Single("SPEED".to_string()).extract(&table, 0),
            Value::text("60")
        );
        assert_eq!(
            TextExtractor::Single("ABSENT".to_string()).extract(&table, 0),
            Value::Null
        );
    }
}
