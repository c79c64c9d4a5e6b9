//! The generic harmonisation pipeline.
//!
//! One [`Harmoniser`] runs any [`JurisdictionDefinition`]: the stage order
//! is fixed and only the column mappings differ between jurisdictions.
//!
//! 1. Schema drift check on the raw extract
//! 2. Grid projection (when configured)
//! 3. Vehicle aggregation and `vehicles_id`
//! 4. Casualty aggregation and `casualties_id`
//! 5. Description lookups and free-text fields
//! 6. Date/time assembly and `date_time_id`
//! 7. Location and `lat_long`
//! 8. `crash_id`
//! 9. Strict structure check against the canonical field set

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{Datelike as _, NaiveDate, NaiveDateTime, Timelike as _};
use crash_etl_crash_models::{Jurisdiction, VehicleType};
use crash_etl_source_models::{
    LatLong, Table, VEHICLE_FIELDS, Value, canonical_field_names,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::{FieldCoercionError, HarmoniseError, UnmappedValueError};
use crate::identifiers::{DateTimeParts, casualties_id, date_time_id, vehicles_id};
use crate::parsing::{
    pad_hhmm, parse_coordinate, parse_count, parse_date, parse_date_time, parse_hour, parse_time,
};
use crate::projection::CoordinateProjector;
use crate::source_def::{
    CasualtyMapping, DateTimeStrategy, HourSource, JurisdictionDefinition, LookupField,
    ProjectionConfig, VehicleMapping,
};
use crate::structure::{CheckMode, StructureReport, check_structure};
use crate::vocabulary::{Dictionary, DictionaryField, Vocabulary};

/// What to do with a record whose numeric field cannot be read.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoercionPolicy {
    /// Fail the whole jurisdiction on the first bad value.
    #[default]
    Abort,
    /// Drop the offending record, log it, and continue.
    SkipRecord,
}

/// Per-jurisdiction harmonisation statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarmoniseReport {
    pub jurisdiction: Jurisdiction,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Records dropped under [`CoercionPolicy::SkipRecord`].
    pub skipped: usize,
    /// Every structure check run, in stage order.
    pub structure_checks: Vec<StructureReport>,
}

impl HarmoniseReport {
    /// Total number of null-filled columns added across all checks.
    #[must_use]
    pub fn columns_added(&self) -> usize {
        self.structure_checks.iter().map(StructureReport::added).sum()
    }
}

/// A harmonised table in canonical form plus its report.
#[derive(Debug, Clone)]
pub struct HarmoniseOutcome {
    pub table: Table,
    pub report: HarmoniseReport,
}

/// Tracks records rejected under the active [`CoercionPolicy`].
struct Rejects {
    policy: CoercionPolicy,
    rows: BTreeSet<usize>,
}

impl Rejects {
    fn reject(&mut self, row: usize, error: FieldCoercionError) -> Result<(), FieldCoercionError> {
        match self.policy {
            CoercionPolicy::Abort => Err(error),
            CoercionPolicy::SkipRecord => {
                if self.rows.insert(row) {
                    log::warn!("Skipping record: {error}");
                }
                Ok(())
            }
        }
    }
}

/// Runs one jurisdiction definition against a raw extract.
pub struct Harmoniser<'a> {
    definition: &'a JurisdictionDefinition,
    vocabulary: &'a Vocabulary,
    projector: &'a dyn CoordinateProjector,
    policy: CoercionPolicy,
}

impl<'a> Harmoniser<'a> {
    #[must_use]
    pub fn new(
        definition: &'a JurisdictionDefinition,
        vocabulary: &'a Vocabulary,
        projector: &'a dyn CoordinateProjector,
        policy: CoercionPolicy,
    ) -> Self {
        Self {
            definition,
            vocabulary,
            projector,
            policy,
        }
    }

    const fn jurisdiction(&self) -> Jurisdiction {
        self.definition.id
    }

    fn label(&self) -> &'static str {
        self.jurisdiction().prefix()
    }

    /// Transforms `raw` into a table with exactly the canonical columns.
    ///
    /// # Errors
    ///
    /// * [`HarmoniseError::Unmapped`] if a raw term has no dictionary entry.
    /// * [`HarmoniseError::Coercion`] if a numeric field cannot be read and
    ///   the policy is [`CoercionPolicy::Abort`].
    /// * [`HarmoniseError::Projection`] if grid coordinates cannot be
    ///   projected.
    pub fn harmonise(&self, mut raw: Table) -> Result<HarmoniseOutcome, HarmoniseError> {
        let label = self.label();
        let rows_in = raw.len();
        let mut rejects = Rejects {
            policy: self.policy,
            rows: BTreeSet::new(),
        };
        let mut checks = Vec::new();

        log::info!("[{label}] Harmonising {rows_in} raw rows");
        checks.push(check_structure(
            &mut raw,
            &self.definition.referenced_columns(),
            CheckMode::AddOnly,
            &format!("[{label}] extract"),
        ));

        if let Some(projection) = &self.definition.projection {
            log::info!("[{label}] Projecting coordinates from {}", projection.name);
            self.project(&mut raw, projection, &mut rejects)?;
        }

        let mut out = raw.select(&[self.definition.row_id.as_str()]);

        if let Some(mapping) = &self.definition.vehicles {
            log::debug!("[{label}] Aggregating vehicles");
            checks.push(self.vehicles(mapping, &raw, &mut out, &mut rejects)?);
        }
        if let Some(mapping) = &self.definition.casualties {
            log::debug!("[{label}] Aggregating casualties");
            self.casualties(mapping, &raw, &mut out, &mut rejects)?;
        }
        log::debug!("[{label}] Mapping description fields");
        self.description(&raw, &mut out)?;
        log::debug!("[{label}] Assembling dates");
        self.date_time(&raw, &mut out, &mut rejects)?;
        log::debug!("[{label}] Building locations");
        self.location(&raw, &mut out, &mut rejects)?;
        self.crash_id(&raw, &mut out, &mut rejects)?;

        let skipped = rejects.rows.len();
        if skipped > 0 {
            out.retain_rows(|row| !rejects.rows.contains(&row));
            log::warn!("[{label}] Skipped {skipped} record(s) with unreadable fields");
        }

        checks.push(check_structure(
            &mut out,
            &canonical_field_names(),
            CheckMode::Strict,
            &format!("[{label}] canonical"),
        ));

        log::info!("[{label}] Harmonised {} rows", out.len());
        Ok(HarmoniseOutcome {
            report: HarmoniseReport {
                jurisdiction: self.jurisdiction(),
                rows_in,
                rows_out: out.len(),
                skipped,
                structure_checks: checks,
            },
            table: out,
        })
    }

    fn row_ref(&self, raw: &Table, row: usize) -> String {
        raw.get(row, &self.definition.row_id)
            .as_raw()
            .unwrap_or_else(|| format!("#{row}"))
    }

    fn coercion(
        &self,
        raw: &Table,
        row: usize,
        column: &str,
        raw_value: String,
        expected: &'static str,
    ) -> FieldCoercionError {
        FieldCoercionError {
            column: column.to_string(),
            row_ref: self.row_ref(raw, row),
            raw_value,
            expected,
        }
    }

    /// Reads an optional count cell. Missing cells give `Ok(None)`.
    fn count_cell(
        &self,
        raw: &Table,
        row: usize,
        column: &str,
        rejects: &mut Rejects,
    ) -> Result<Option<i64>, FieldCoercionError> {
        let Some(text) = raw.get(row, column).as_raw() else {
            return Ok(None);
        };
        match parse_count(&text) {
            Some(n) => Ok(Some(n)),
            None => {
                rejects.reject(row, self.coercion(raw, row, column, text, "a count"))?;
                Ok(None)
            }
        }
    }

    fn coordinate_cell(
        &self,
        raw: &Table,
        row: usize,
        column: &str,
        rejects: &mut Rejects,
    ) -> Result<Option<f64>, FieldCoercionError> {
        let Some(text) = raw.get(row, column).as_raw() else {
            return Ok(None);
        };
        match parse_coordinate(&text) {
            Some(v) => Ok(Some(v)),
            None => {
                rejects.reject(row, self.coercion(raw, row, column, text, "a coordinate"))?;
                Ok(None)
            }
        }
    }

    fn project(
        &self,
        raw: &mut Table,
        projection: &ProjectionConfig,
        rejects: &mut Rejects,
    ) -> Result<(), HarmoniseError> {
        let mut rows = Vec::new();
        let mut points = Vec::new();
        for row in 0..raw.len() {
            let x = self.coordinate_cell(raw, row, &projection.x, rejects)?;
            let y = self.coordinate_cell(raw, row, &projection.y, rejects)?;
            if let (Some(x), Some(y)) = (x, y) {
                rows.push(row);
                points.push((x, y));
            }
        }

        let projected = self.projector.project(projection.name, &points)?;
        let mut lat = vec![Value::Null; raw.len()];
        let mut long = vec![Value::Null; raw.len()];
        for (row, point) in rows.into_iter().zip(projected) {
            lat[row] = Value::Float(point.latitude);
            long[row] = Value::Float(point.longitude);
        }
        raw.set_column("calc_lat", lat);
        raw.set_column("calc_long", long);
        Ok(())
    }

    /// Sums each bucket's source columns, treating missing cells as zero.
    /// Buckets without source columns are added by the structure checker
    /// and then zero-filled.
    fn vehicles(
        &self,
        mapping: &VehicleMapping,
        raw: &Table,
        out: &mut Table,
        rejects: &mut Rejects,
    ) -> Result<StructureReport, FieldCoercionError> {
        for vehicle in VehicleType::all() {
            let Some(columns) = mapping.columns_for(*vehicle) else {
                continue;
            };
            let mut values = Vec::with_capacity(raw.len());
            for row in 0..raw.len() {
                let mut total = Some(0);
                for column in columns {
                    let cell = self.count_cell(raw, row, column, rejects)?.unwrap_or(0);
                    total = self.add_count(raw, row, column, total, Some(cell), rejects)?;
                }
                values.push(total.map_or(Value::Null, Value::Int));
            }
            out.set_column(vehicle.as_ref(), values);
        }

        let report = check_structure(
            out,
            VEHICLE_FIELDS,
            CheckMode::AddOnly,
            &format!("[{}] vehicles", self.label()),
        );
        for name in &report.missing {
            out.set_column(name, vec![Value::Int(0); out.len()]);
        }

        let ids = (0..out.len())
            .map(|row| {
                let mut counts = [0; VehicleType::COUNT];
                for vehicle in VehicleType::all() {
                    counts[vehicle.index()] = out.get(row, vehicle.as_ref()).as_int().unwrap_or(0);
                }
                Value::Text(vehicles_id(&counts))
            })
            .collect();
        out.set_column("vehicles_id", ids);
        Ok(report)
    }

    /// Sums a list of columns. Any missing cell makes the sum missing.
    fn strict_sum(
        &self,
        raw: &Table,
        row: usize,
        columns: &[String],
        rejects: &mut Rejects,
    ) -> Result<Option<i64>, FieldCoercionError> {
        if columns.is_empty() {
            return Ok(None);
        }
        let mut total = Some(0);
        for column in columns {
            let cell = self.count_cell(raw, row, column, rejects)?;
            total = self.add_count(raw, row, column, total, cell, rejects)?;
        }
        Ok(total)
    }

    /// Adds `cell` to a running count. Either side missing gives `None`;
    /// overflow is a coercion error on `column`.
    fn add_count(
        &self,
        raw: &Table,
        row: usize,
        column: &str,
        total: Option<i64>,
        cell: Option<i64>,
        rejects: &mut Rejects,
    ) -> Result<Option<i64>, FieldCoercionError> {
        let (Some(total), Some(cell)) = (total, cell) else {
            return Ok(None);
        };
        match total.checked_add(cell) {
            Some(sum) => Ok(Some(sum)),
            None => {
                let value = format!("{total} + {cell}");
                rejects.reject(row, self.coercion(raw, row, column, value, "a bounded count"))?;
                Ok(None)
            }
        }
    }

    fn casualties(
        &self,
        mapping: &CasualtyMapping,
        raw: &Table,
        out: &mut Table,
        rejects: &mut Rejects,
    ) -> Result<(), FieldCoercionError> {
        let n = raw.len();
        let mut columns: [Vec<Value>; 5] = std::array::from_fn(|_| Vec::with_capacity(n));
        for row in 0..n {
            let fatalities = self.strict_sum(raw, row, &mapping.fatalities, rejects)?;
            let serious = self.strict_sum(raw, row, &mapping.serious_injuries, rejects)?;
            let minor = self.strict_sum(raw, row, &mapping.minor_injuries, rejects)?;
            let total = match &mapping.casualties {
                Some(total) => self.strict_sum(raw, row, total, rejects)?,
                None => {
                    let partial =
                        self.add_count(raw, row, "casualties", fatalities, serious, rejects)?;
                    self.add_count(raw, row, "casualties", partial, minor, rejects)?
                }
            };

            columns[0].push(total.into());
            columns[1].push(fatalities.into());
            columns[2].push(serious.into());
            columns[3].push(minor.into());
            columns[4].push(
                total
                    .map(|t| Value::Text(casualties_id(t, fatalities, serious, minor)))
                    .unwrap_or_default(),
            );
        }

        let [total, fatalities, serious, minor, ids] = columns;
        out.set_column("casualties", total);
        out.set_column("fatalities", fatalities);
        out.set_column("serious_injuries", serious);
        out.set_column("minor_injuries", minor);
        out.set_column("casualties_id", ids);
        Ok(())
    }

    /// Maps every row of `lookup` through `dictionary`. A missing cell
    /// without a configured default is an unmapped empty term.
    fn lookup<T: Copy + PartialEq + FromStr>(
        &self,
        raw: &Table,
        dictionary: &Dictionary<T>,
        lookup: &LookupField,
    ) -> Result<Vec<T>, UnmappedValueError> {
        (0..raw.len())
            .map(|row| {
                let term = lookup.raw(raw, row).unwrap_or_default();
                dictionary.map(self.jurisdiction(), &term)
            })
            .collect()
    }

    fn description(&self, raw: &Table, out: &mut Table) -> Result<(), UnmappedValueError> {
        let vocabulary = self.vocabulary;

        for (field, lookup) in self.definition.description.lookups() {
            match field {
                DictionaryField::Severity => {
                    let values = self.lookup(raw, &vocabulary.severity, lookup)?;
                    out.set_column("severity", labels(&values));
                }
                DictionaryField::Midblock => {
                    let midblock: Vec<bool> = if lookup.equals.is_some() {
                        (0..raw.len())
                            .map(|row| lookup.flag(raw, row).unwrap_or(false))
                            .collect()
                    } else {
                        self.lookup(raw, &vocabulary.midblock, lookup)?
                            .iter()
                            .map(|p| p.is_midblock())
                            .collect()
                    };
                    out.set_column(
                        "midblock",
                        midblock.iter().map(|m| Value::Bool(*m)).collect(),
                    );
                    out.set_column(
                        "intersection",
                        midblock.iter().map(|m| Value::Bool(!m)).collect(),
                    );
                }
                DictionaryField::RoadPositionHorizontal => {
                    let values = self.lookup(raw, &vocabulary.road_position_horizontal, lookup)?;
                    out.set_column("road_position_horizontal", labels(&values));
                }
                DictionaryField::RoadPositionVertical => {
                    let values = self.lookup(raw, &vocabulary.road_position_vertical, lookup)?;
                    out.set_column("road_position_vertical", labels(&values));
                }
                DictionaryField::RoadSealed => {
                    let values = self.lookup(raw, &vocabulary.road_sealed, lookup)?;
                    out.set_column(
                        "road_sealed",
                        values.iter().map(|s| Value::tri_state(s.as_bool())).collect(),
                    );
                }
                DictionaryField::RoadWet => {
                    let values = self.lookup(raw, &vocabulary.road_wet, lookup)?;
                    out.set_column(
                        "road_wet",
                        values.iter().map(|s| Value::tri_state(s.as_bool())).collect(),
                    );
                }
                DictionaryField::Weather => {
                    let values = self.lookup(raw, &vocabulary.weather, lookup)?;
                    out.set_column("weather", labels(&values));
                }
                DictionaryField::Lighting => {
                    let values = self.lookup(raw, &vocabulary.lighting, lookup)?;
                    out.set_column("lighting", labels(&values));
                }
                DictionaryField::TrafficControls => {
                    let values = self.lookup(raw, &vocabulary.traffic_controls, lookup)?;
                    out.set_column("traffic_controls", labels(&values));
                }
                // Calendar dictionaries are applied by the date/time stage.
                DictionaryField::Month | DictionaryField::DayOfWeek => {}
            }
        }

        for (name, extractor) in self.definition.description.texts() {
            let values = (0..raw.len()).map(|row| extractor.extract(raw, row)).collect();
            out.set_column(name, values);
        }
        Ok(())
    }

    fn date_time(
        &self,
        raw: &Table,
        out: &mut Table,
        rejects: &mut Rejects,
    ) -> Result<(), HarmoniseError> {
        let mut parts = Vec::with_capacity(raw.len());
        let mut approximate = Vec::with_capacity(raw.len());

        match &self.definition.date_time {
            DateTimeStrategy::Coded {
                year,
                month,
                day_of_week,
                hour,
            } => {
                let months = month
                    .as_ref()
                    .map(|m| self.lookup(raw, &self.vocabulary.month, m))
                    .transpose()?;
                let weekdays = day_of_week
                    .as_ref()
                    .map(|d| self.lookup(raw, &self.vocabulary.day_of_week, d))
                    .transpose()?;

                for row in 0..raw.len() {
                    let hour = match hour {
                        None => None,
                        Some(source) => self.hour_cell(raw, row, source, rejects)?,
                    };
                    parts.push(DateTimeParts {
                        year: self.count_cell(raw, row, year, rejects)?,
                        month: months.as_ref().map(|m| i64::from(m[row].number())),
                        day_of_month: None,
                        day_of_week: weekdays.as_ref().map(|d| i64::from(d[row].number())),
                        hour,
                    });
                    approximate.push(true);
                }
            }
            DateTimeStrategy::Combined { date, time, format } => {
                for row in 0..raw.len() {
                    // No partial timestamps: a date without a time leaves
                    // every calendar part missing, year included.
                    let (Some(d), Some(t)) = (raw.get(row, date).as_raw(), raw.get(row, time).as_raw())
                    else {
                        parts.push(DateTimeParts::default());
                        approximate.push(true);
                        continue;
                    };
                    let text = format!("{d} {t}");
                    let parsed = parse_date_time(&text, format);
                    self.push_timestamp(raw, row, date, text, parsed, &mut parts, rejects)?;
                    approximate.push(false);
                }
            }
            DateTimeStrategy::DatePlusHhmm {
                date,
                time,
                date_format,
            } => {
                for row in 0..raw.len() {
                    let Some(d) = raw.get(row, date).as_raw() else {
                        parts.push(DateTimeParts::default());
                        approximate.push(true);
                        continue;
                    };
                    let time_raw = raw.get(row, time).as_raw();
                    let Some(hhmm) = pad_hhmm(time_raw.as_deref()) else {
                        let value = time_raw.unwrap_or_default();
                        rejects.reject(row, self.coercion(raw, row, time, value, "an HHMM time"))?;
                        parts.push(DateTimeParts::default());
                        approximate.push(true);
                        continue;
                    };
                    let text = format!("{d} {hhmm}");
                    let parsed = parse_date_time(&text, &format!("{date_format} %H%M"));
                    self.push_timestamp(raw, row, date, text, parsed, &mut parts, rejects)?;
                    approximate.push(time_raw.is_none());
                }
            }
            DateTimeStrategy::Separate {
                date,
                date_format,
                time,
                time_format,
            } => {
                for row in 0..raw.len() {
                    let parsed_date = match raw.get(row, date).as_raw() {
                        None => None,
                        Some(text) => match parse_date(&text, date_format) {
                            Some(d) => Some(d),
                            None => {
                                rejects.reject(row, self.coercion(raw, row, date, text, "a date"))?;
                                None
                            }
                        },
                    };
                    let parsed_time = match raw.get(row, time).as_raw() {
                        None => None,
                        Some(text) => match parse_time(&text, time_format) {
                            Some(t) => Some(t),
                            None => {
                                rejects.reject(row, self.coercion(raw, row, time, text, "a time"))?;
                                None
                            }
                        },
                    };

                    let mut row_parts = parsed_date.map_or_else(DateTimeParts::default, date_parts);
                    row_parts.hour = parsed_time.map(|t| i64::from(t.hour()));
                    approximate.push(parsed_date.is_none() || parsed_time.is_none());
                    parts.push(row_parts);
                }
            }
        }

        out.set_column("year", parts.iter().map(|p| p.year.into()).collect());
        out.set_column("month", parts.iter().map(|p| p.month.into()).collect());
        out.set_column("day_of_week", parts.iter().map(|p| p.day_of_week.into()).collect());
        out.set_column("day_of_month", parts.iter().map(|p| p.day_of_month.into()).collect());
        out.set_column("hour", parts.iter().map(|p| p.hour.into()).collect());
        out.set_column("approximate", approximate.into_iter().map(Value::Bool).collect());
        out.set_column(
            "date_time_id",
            parts.iter().map(|p| Value::Text(date_time_id(p))).collect(),
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_timestamp(
        &self,
        raw: &Table,
        row: usize,
        column: &str,
        text: String,
        parsed: Option<NaiveDateTime>,
        parts: &mut Vec<DateTimeParts>,
        rejects: &mut Rejects,
    ) -> Result<(), FieldCoercionError> {
        match parsed {
            Some(timestamp) => {
                let mut row_parts = date_parts(timestamp.date());
                row_parts.hour = Some(i64::from(timestamp.hour()));
                parts.push(row_parts);
            }
            None => {
                rejects.reject(row, self.coercion(raw, row, column, text, "a timestamp"))?;
                parts.push(DateTimeParts::default());
            }
        }
        Ok(())
    }

    fn hour_cell(
        &self,
        raw: &Table,
        row: usize,
        source: &HourSource,
        rejects: &mut Rejects,
    ) -> Result<Option<i64>, FieldCoercionError> {
        let column = source.field();
        let Some(text) = raw.get(row, column).as_raw() else {
            return Ok(None);
        };
        let hour = match source {
            HourSource::Number { .. } => parse_count(&text).filter(|h| *h < 24),
            HourSource::TimeString { formats, .. } => {
                parse_hour(&text, formats).map(i64::from)
            }
        };
        if hour.is_none() {
            rejects.reject(row, self.coercion(raw, row, column, text, "an hour"))?;
        }
        Ok(hour)
    }

    fn location(
        &self,
        raw: &Table,
        out: &mut Table,
        rejects: &mut Rejects,
    ) -> Result<(), FieldCoercionError> {
        let mapping = &self.definition.location;

        if let Some(pair) = &mapping.lat_long {
            let mut values = Vec::with_capacity(raw.len());
            for row in 0..raw.len() {
                let latitude = self.coordinate_cell(raw, row, &pair.latitude, rejects)?;
                let longitude = self.coordinate_cell(raw, row, &pair.longitude, rejects)?;
                values.push(match (latitude, longitude) {
                    (Some(latitude), Some(longitude)) => Value::LatLong(LatLong {
                        latitude,
                        longitude,
                    }),
                    _ => Value::Null,
                });
            }
            out.set_column("lat_long", values);
        }

        for (name, column) in [("latitude", &mapping.latitude), ("longitude", &mapping.longitude)] {
            let Some(column) = column else {
                continue;
            };
            let mut values = Vec::with_capacity(raw.len());
            for row in 0..raw.len() {
                values.push(self.coordinate_cell(raw, row, column, rejects)?.into());
            }
            out.set_column(name, values);
        }

        let jurisdiction = self.jurisdiction();
        out.add_constant_column("country", &Value::text(jurisdiction.country()));
        out.add_constant_column("state", &Value::text(jurisdiction.state()));

        for (name, column) in [
            ("local_government_area", &mapping.local_government_area),
            ("statistical_area", &mapping.statistical_area),
            ("suburb", &mapping.suburb),
        ] {
            if let Some(column) = column {
                let values = raw
                    .column_values(column)
                    .map(|v| v.as_raw().map_or(Value::Null, Value::Text))
                    .collect();
                out.set_column(name, values);
            }
        }
        Ok(())
    }

    fn crash_id(
        &self,
        raw: &Table,
        out: &mut Table,
        rejects: &mut Rejects,
    ) -> Result<(), FieldCoercionError> {
        let prefix = self.jurisdiction().prefix();
        let mut ids = Vec::with_capacity(raw.len());
        for row in 0..raw.len() {
            match raw.get(row, &self.definition.row_id).as_raw() {
                Some(id) => ids.push(Value::Text(format!("{prefix}{id}"))),
                None => {
                    rejects.reject(
                        row,
                        self.coercion(raw, row, &self.definition.row_id, String::new(), "a row id"),
                    )?;
                    ids.push(Value::Null);
                }
            }
        }
        out.set_column("crash_id", ids);
        Ok(())
    }
}

fn labels<T: ToString>(values: &[T]) -> Vec<Value> {
    values.iter().map(|v| Value::Text(v.to_string())).collect()
}

fn date_parts(date: NaiveDate) -> DateTimeParts {
    DateTimeParts {
        year: Some(i64::from(date.year())),
        month: Some(i64::from(date.month())),
        day_of_month: Some(i64::from(date.day())),
        day_of_week: Some(i64::from(date.weekday().number_from_monday())),
        hour: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProjectionError;
    use crate::projection::ProjectionName;
    use crate::source_def::parse_jurisdiction_toml;

    /// Returns the input grid coordinates as if they were degrees.
    struct IdentityProjector;

    impl CoordinateProjector for IdentityProjector {
        fn project(
            &self,
            _projection: ProjectionName,
            points: &[(f64, f64)],
        ) -> Result<Vec<LatLong>, ProjectionError> {
            Ok(points
                .iter()
                .map(|&(x, y)| LatLong {
                    latitude: y,
                    longitude: x,
                })
                .collect())
        }
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(columns);
        for row in rows {
            t.push_row(row.iter().map(|v| Value::text(*v)).collect());
        }
        t
    }

    fn run(
        toml: &str,
        raw: Table,
        policy: CoercionPolicy,
    ) -> Result<HarmoniseOutcome, HarmoniseError> {
        let def = parse_jurisdiction_toml(toml).unwrap();
        Harmoniser::new(&def, Vocabulary::embedded(), &IdentityProjector, policy).harmonise(raw)
    }

    const NZ: &str = r#"
        id = "nz"
        name = "New Zealand"
        row_id = "OBJECTID"

        [extract]
        path = "crash_nz/crash_nz.csv"

        [vehicles]
        car_sedan = ["carStation"]
        bus = ["bus", "schoolBus"]

        [casualties]
        fatalities = ["fatalCount"]
        serious_injuries = ["seriousInj"]
        minor_injuries = ["minorInjur"]

        [description]
        severity = "crashSever"
        midblock = "intersec_1"
        traffic_controls = { field = "trafficCon", missing = "Nil" }
        speed_limit = "speedLimit"

        [date_time]
        type = "coded"
        year = "crashYear"

        [location]
        lat_long = { latitude = "X", longitude = "Y" }
        latitude = "X"
        longitude = "Y"
        local_government_area = "tlaName"
    "#;

    const NZ_COLUMNS: &[&str] = &[
        "OBJECTID", "carStation", "bus", "schoolBus", "fatalCount", "seriousInj", "minorInjur",
        "crashSever", "intersec_1", "trafficCon", "speedLimit", "crashYear", "X", "Y", "tlaName",
    ];

    fn nz_raw() -> Table {
        table(
            NZ_COLUMNS,
            &[
                &[
                    "7", "2", "1", "0", "1", "0", "2", "F", "Intersection", "", "50", "2019",
                    "-36.8", "174.7", "Auckland",
                ],
                &[
                    "8", "", "", "", "0", "0", "0", "N", "Not at intersection", "Stop Sign", "100",
                    "2019", "-41.2", "174.8", "",
                ],
            ],
        )
    }

    #[test]
    fn output_has_exactly_the_canonical_columns() {
        let outcome = run(NZ, nz_raw(), CoercionPolicy::Abort).unwrap();
        assert_eq!(outcome.table.columns(), canonical_field_names());
        assert_eq!(outcome.report.rows_out, 2);
    }

    #[test]
    fn nz_record_harmonises() {
        let t = run(NZ, nz_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "crash_id"), &Value::text("NZ7"));
        assert_eq!(t.get(0, "vehicles_id"), &Value::text("2c1B"));
        assert_eq!(t.get(0, "casualties_id"), &Value::text("3c1f2m"));
        assert_eq!(t.get(0, "casualties"), &Value::Int(3));
        assert_eq!(t.get(0, "severity"), &Value::text("fatality"));
        assert_eq!(t.get(0, "traffic_controls"), &Value::text("none"));
        assert_eq!(t.get(0, "speed_limit"), &Value::text("50"));
        assert_eq!(t.get(0, "country"), &Value::text("NZ"));
        assert_eq!(t.get(0, "state"), &Value::text("NZ"));
        assert_eq!(t.get(0, "local_government_area"), &Value::text("Auckland"));
        assert_eq!(t.get(1, "local_government_area"), &Value::Null);
        assert_eq!(
            t.get(0, "lat_long"),
            &Value::LatLong(LatLong {
                latitude: -36.8,
                longitude: 174.7
            })
        );
        assert_eq!(t.get(1, "vehicles_id"), &Value::Text(String::new()));
        assert_eq!(t.get(1, "casualties_id"), &Value::text("0c"));
    }

    #[test]
    fn vehicle_buckets_without_columns_are_zero() {
        let t = run(NZ, nz_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "tram"), &Value::Int(0));
        assert_eq!(t.get(1, "car_sedan"), &Value::Int(0));
    }

    #[test]
    fn year_only_dates_are_approximate() {
        let t = run(NZ, nz_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "date_time_id"), &Value::text("2019----"));
        assert_eq!(t.get(0, "year"), &Value::Int(2019));
        assert_eq!(t.get(0, "month"), &Value::Null);
        assert_eq!(t.get(0, "approximate"), &Value::Bool(true));
    }

    #[test]
    fn intersection_is_the_negation_of_midblock() {
        let t = run(NZ, nz_raw(), CoercionPolicy::Abort).unwrap().table;
        for row in 0..t.len() {
            let midblock = t.get(row, "midblock").as_bool().unwrap();
            let intersection = t.get(row, "intersection").as_bool().unwrap();
            assert_ne!(midblock, intersection);
        }
        assert_eq!(t.get(0, "intersection"), &Value::Bool(true));
        assert_eq!(t.get(1, "midblock"), &Value::Bool(true));
    }

    #[test]
    fn unmapped_term_is_fatal() {
        let mut raw = nz_raw();
        raw.set_column("crashSever", vec![Value::text("F"), Value::text("Catastrophic")]);
        let err = run(NZ, raw, CoercionPolicy::SkipRecord).unwrap_err();
        let HarmoniseError::Unmapped(err) = err else {
            panic!("expected unmapped error, got {err:?}");
        };
        assert_eq!(err.jurisdiction, Jurisdiction::Nz);
        assert_eq!(err.field, DictionaryField::Severity);
        assert_eq!(err.raw_value, "Catastrophic");
    }

    #[test]
    fn missing_term_without_default_is_unmapped() {
        let mut raw = nz_raw();
        raw.set_column("intersec_1", vec![Value::Null, Value::text("Intersection")]);
        let err = run(NZ, raw, CoercionPolicy::Abort).unwrap_err();
        assert!(matches!(
            err,
            HarmoniseError::Unmapped(UnmappedValueError { ref raw_value, .. }) if raw_value.is_empty()
        ));
    }

    #[test]
    fn non_numeric_count_aborts_by_default() {
        let mut raw = nz_raw();
        raw.set_column("bus", vec![Value::text("one"), Value::Null]);
        let err = run(NZ, raw, CoercionPolicy::Abort).unwrap_err();
        let HarmoniseError::Coercion(err) = err else {
            panic!("expected coercion error, got {err:?}");
        };
        assert_eq!(err.column, "bus");
        assert_eq!(err.row_ref, "7");
        assert_eq!(err.raw_value, "one");
    }

    #[test]
    fn skip_policy_drops_only_the_bad_record() {
        let mut raw = nz_raw();
        raw.set_column("fatalCount", vec![Value::text("-1"), Value::text("0")]);
        let outcome = run(NZ, raw, CoercionPolicy::SkipRecord).unwrap();
        assert_eq!(outcome.report.rows_in, 2);
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.table.get(0, "crash_id"), &Value::text("NZ8"));
    }

    #[test]
    fn overflowing_vehicle_sum_is_a_coercion_error() {
        let mut raw = nz_raw();
        raw.set_column("bus", vec![Value::text(i64::MAX.to_string()), Value::Null]);
        raw.set_column("schoolBus", vec![Value::text("1"), Value::Null]);
        let err = run(NZ, raw, CoercionPolicy::Abort).unwrap_err();
        let HarmoniseError::Coercion(err) = err else {
            panic!("expected coercion error, got {err:?}");
        };
        assert_eq!(err.column, "schoolBus");
        assert_eq!(err.row_ref, "7");
        assert_eq!(err.raw_value, format!("{} + 1", i64::MAX));
    }

    #[test]
    fn overflowing_casualty_total_skips_the_record() {
        let mut raw = nz_raw();
        raw.set_column("fatalCount", vec![Value::text(i64::MAX.to_string()), Value::text("0")]);
        let err = run(NZ, raw.clone(), CoercionPolicy::Abort).unwrap_err();
        assert!(matches!(
            err,
            HarmoniseError::Coercion(FieldCoercionError { ref column, .. }) if column == "casualties"
        ));

        let outcome = run(NZ, raw, CoercionPolicy::SkipRecord).unwrap();
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.table.get(0, "crash_id"), &Value::text("NZ8"));
    }

    #[test]
    fn missing_casualty_breakdown_nulls_the_total() {
        let mut raw = nz_raw();
        raw.set_column("seriousInj", vec![Value::Null, Value::text("0")]);
        let t = run(NZ, raw, CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "casualties"), &Value::Null);
        assert_eq!(t.get(0, "casualties_id"), &Value::Null);
        assert_eq!(t.get(0, "fatalities"), &Value::Int(1));
    }

    #[test]
    fn schema_drift_is_reported_not_fatal() {
        let raw = nz_raw().select(
            &NZ_COLUMNS
                .iter()
                .filter(|c| **c != "speedLimit")
                .copied()
                .collect::<Vec<_>>(),
        );
        let outcome = run(NZ, raw, CoercionPolicy::Abort).unwrap();
        assert_eq!(outcome.report.structure_checks[0].missing, vec!["speedLimit"]);
        assert!(outcome.report.columns_added() >= 1);
        assert_eq!(outcome.table.get(0, "speed_limit"), &Value::Null);
    }

    const ACT: &str = r#"
        id = "act"
        name = "Australian Capital Territory"
        row_id = "crash_id"

        [extract]
        format = "parquet"
        path = "crash_act/crash"

        [description]
        severity = "crash_severity"
        midblock = { field = "midblock", equals = "YES" }
        road_sealed = "road_condition"
        road_wet = "road_condition"

        [date_time]
        type = "separate"
        date = "crash_date"
        date_format = "%Y-%m-%d"
        time = "crash_time"
        time_format = "%Y-%m-%d %H:%M:%S"

        [location]
        lat_long = { latitude = "latitude", longitude = "longitude" }
        latitude = "latitude"
        longitude = "longitude"
        suburb = "suburb_location"
    "#;

    fn act_raw() -> Table {
        table(
            &[
                "crash_id", "crash_severity", "midblock", "road_condition", "crash_date",
                "crash_time", "latitude", "longitude", "suburb_location",
            ],
            &[
                &[
                    "500", "Property Damage Only", "YES", "Sealed - Wet", "2019-05-02",
                    "1970-01-01 17:45:00", "-35.28", "149.13", "CITY",
                ],
                &[
                    "501", "Injury", "", "Unknown", "2019-05-04", "", "-35.3", "149.1", "",
                ],
            ],
        )
    }

    #[test]
    fn separate_date_and_time_fields() {
        let t = run(ACT, act_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "date_time_id"), &Value::text("2019-5-2-4-17"));
        assert_eq!(t.get(0, "approximate"), &Value::Bool(false));
        assert_eq!(t.get(1, "hour"), &Value::Null);
        assert_eq!(t.get(1, "approximate"), &Value::Bool(true));
    }

    #[test]
    fn surface_terms_are_tri_state() {
        let t = run(ACT, act_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "road_sealed"), &Value::Bool(true));
        assert_eq!(t.get(0, "road_wet"), &Value::Bool(true));
        assert_eq!(t.get(1, "road_sealed"), &Value::Unknown);
        assert_eq!(t.get(1, "road_wet"), &Value::Unknown);
    }

    #[test]
    fn flag_midblock_is_true_only_for_the_flag_term() {
        let mut raw = act_raw();
        raw.push_row(vec![
            Value::text("502"),
            Value::text("Injury"),
            Value::text("Unknown"),
            Value::text("Unknown"),
            Value::text("2019-05-04"),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]);
        let t = run(ACT, raw, CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "midblock"), &Value::Bool(true));
        assert_eq!(t.get(0, "intersection"), &Value::Bool(false));
        assert_eq!(t.get(1, "midblock"), &Value::Bool(false));
        assert_eq!(t.get(1, "intersection"), &Value::Bool(true));
        assert_eq!(t.get(2, "midblock"), &Value::Bool(false));
        assert_eq!(t.get(2, "intersection"), &Value::Bool(true));
    }

    #[test]
    fn sources_without_units_leave_vehicles_missing() {
        let t = run(ACT, act_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "vehicles_id"), &Value::Null);
        assert_eq!(t.get(0, "car_sedan"), &Value::Null);
        assert_eq!(t.get(0, "casualties_id"), &Value::Null);
        assert_eq!(t.get(0, "suburb"), &Value::text("CITY"));
        assert_eq!(t.get(0, "country"), &Value::text("AU"));
    }

    const WA: &str = r#"
        id = "wa"
        name = "Western Australia"
        row_id = "ACC_ID"

        [extract]
        format = "parquet"
        path = "crash_wa/crash"

        [description]
        severity = "SEVERITY"
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

    fn wa_raw() -> Table {
        table(
            &[
                "ACC_ID", "SEVERITY", "EVENT_NATURE", "EVENT_TYPE", "CRASH_DATE", "CRASH_TIME",
                "LATITUDE", "LONGITUDE",
            ],
            &[
                &["9", "Fatal", "Rear End", "Vehicle", "03/02/2018", "930", "-31.9", "115.8"],
                &["10", "PDO Major", "Sideswipe", "", "04/02/2018", "", "-32.0", "115.9"],
            ],
        )
    }

    #[test]
    fn hhmm_time_is_padded() {
        let t = run(WA, wa_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "date_time_id"), &Value::text("2018-2-3-6-9"));
        assert_eq!(t.get(0, "approximate"), &Value::Bool(false));
        assert_eq!(t.get(1, "hour"), &Value::Int(0));
        assert_eq!(t.get(1, "approximate"), &Value::Bool(true));
    }

    #[test]
    fn combined_text_is_missing_when_any_part_is() {
        let t = run(WA, wa_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "crash_type"), &Value::text("Rear End Vehicle"));
        assert_eq!(t.get(1, "crash_type"), &Value::Null);
    }

    #[test]
    fn wa_latitude_stays_unset() {
        let t = run(WA, wa_raw(), CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "latitude"), &Value::Null);
        assert_eq!(t.get(0, "longitude"), &Value::Float(115.8));
        assert!(matches!(t.get(0, "lat_long"), Value::LatLong(_)));
    }

    #[test]
    fn projected_coordinates_feed_lat_long() {
        let toml = r#"
            id = "sa"
            name = "South Australia"
            row_id = "REPORT_ID"

            [extract]
            path = "crash_sa/crash.csv"

            [projection]
            name = "sa_lambert"
            x = "ACCLOC_X"
            y = "ACCLOC_Y"

            [date_time]
            type = "combined"
            date = "d"
            time = "t"
            format = "%d/%m/%Y %H:%M:%S"

            [location]
            lat_long = { latitude = "calc_lat", longitude = "calc_long" }
            latitude = "calc_lat"
            longitude = "calc_long"
        "#;
        let raw = table(
            &["REPORT_ID", "ACCLOC_X", "ACCLOC_Y", "d", "t"],
            &[
                &["123", "138.6", "-34.9", "01/02/2015", "13:05:00"],
                &["124", "", "", "", ""],
            ],
        );
        let t = run(toml, raw, CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "crash_id"), &Value::text("SA123"));
        assert_eq!(t.get(0, "latitude"), &Value::Float(-34.9));
        assert_eq!(t.get(0, "longitude"), &Value::Float(138.6));
        assert_eq!(t.get(0, "date_time_id"), &Value::text("2015-2-1-7-13"));
        assert_eq!(t.get(1, "lat_long"), &Value::Null);
        assert_eq!(t.get(1, "date_time_id"), &Value::text("----"));
    }

    #[test]
    fn combined_date_without_time_drops_every_calendar_part() {
        let toml = r#"
            id = "vic"
            name = "Victoria"
            row_id = "ACCIDENT_NO"

            [extract]
            path = "crash_vic/ACCIDENT.csv"

            [date_time]
            type = "combined"
            date = "ACCIDENTDATE"
            time = "ACCIDENTTIME"
            format = "%d/%m/%Y %H:%M:%S"
        "#;
        let raw = table(
            &["ACCIDENT_NO", "ACCIDENTDATE", "ACCIDENTTIME"],
            &[&["T1", "01/02/2015", ""]],
        );
        let t = run(toml, raw, CoercionPolicy::Abort).unwrap().table;
        assert_eq!(t.get(0, "year"), &Value::Null);
        assert_eq!(t.get(0, "month"), &Value::Null);
        assert_eq!(t.get(0, "day_of_month"), &Value::Null);
        assert_eq!(t.get(0, "approximate"), &Value::Bool(true));
        assert_eq!(t.get(0, "date_time_id"), &Value::text("----"));
    }
}
