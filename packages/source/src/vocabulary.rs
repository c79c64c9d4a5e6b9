//! Vocabulary dictionaries mapping raw source terms onto the canonical
//! enumerations.
//!
//! The dictionaries are plain data (`vocabulary.toml`, embedded at compile
//! time) parsed once into read-only lookup tables. Lookups are exact and
//! fail fast: a term that is not in a dictionary produces an
//! [`UnmappedValueError`] instead of a guessed default.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::LazyLock;

use crash_etl_crash_models::{
    DayOfWeek, Jurisdiction, Lighting, Month, RoadPosition, RoadPositionHorizontal,
    RoadPositionVertical, Severity, SurfaceMoisture, SurfaceSealing, TrafficControls, Weather,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::UnmappedValueError;

const VOCABULARY_TOML: &str = include_str!("vocabulary.toml");

static EMBEDDED: LazyLock<Vocabulary> = LazyLock::new(|| {
    Vocabulary::parse(VOCABULARY_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded vocabulary: {e}"))
});

/// A canonical field whose value is produced by a dictionary lookup.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DictionaryField {
    Severity,
    Midblock,
    RoadPositionHorizontal,
    RoadPositionVertical,
    RoadSealed,
    RoadWet,
    Weather,
    Lighting,
    TrafficControls,
    Month,
    DayOfWeek,
}

/// Errors building a [`Vocabulary`].
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("Invalid vocabulary TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field}: term {term:?} maps to more than one canonical value")]
    ConflictingTerm { field: DictionaryField, term: String },
    #[error("{field}: {value:?} is not a canonical value")]
    UnknownCanonical { field: DictionaryField, value: String },
}

/// Exact-match lookup from raw term to canonical value `T`.
#[derive(Debug, Clone)]
pub struct Dictionary<T> {
    field: DictionaryField,
    entries: HashMap<String, T>,
}

impl<T: Copy + PartialEq + FromStr> Dictionary<T> {
    /// Builds a dictionary from `canonical -> [raw terms]` groups, where
    /// the canonical side is the string form of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`VocabularyError::UnknownCanonical`] if a group name is not
    /// a `T`, or [`VocabularyError::ConflictingTerm`] if a raw term is listed
    /// under two different canonical values.
    pub fn from_groups(
        field: DictionaryField,
        groups: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, VocabularyError> {
        let mut entries = HashMap::new();
        for (name, terms) in groups {
            let canonical = T::from_str(&name)
                .map_err(|_| VocabularyError::UnknownCanonical { field, value: name.clone() })?;
            for term in terms {
                match entries.insert(term.clone(), canonical) {
                    Some(previous) if previous != canonical => {
                        return Err(VocabularyError::ConflictingTerm { field, term });
                    }
                    _ => {}
                }
            }
        }
        Ok(Self { field, entries })
    }

    #[must_use]
    pub const fn field(&self) -> DictionaryField {
        self.field
    }

    #[must_use]
    pub fn get(&self, raw: &str) -> Option<T> {
        self.entries.get(raw).copied()
    }

    #[must_use]
    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains_key(raw)
    }

    /// Looks up `raw`, failing with the jurisdiction and field attached.
    ///
    /// # Errors
    ///
    /// Returns [`UnmappedValueError`] if `raw` is not a known term.
    pub fn map(&self, jurisdiction: Jurisdiction, raw: &str) -> Result<T, UnmappedValueError> {
        self.get(raw).ok_or_else(|| UnmappedValueError {
            jurisdiction,
            field: self.field,
            raw_value: raw.to_string(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct VocabularyFile {
    severity: Groups,
    road_position: Groups,
    road_position_horizontal: Groups,
    road_position_vertical: Groups,
    road_sealed: Groups,
    road_wet: Groups,
    weather: Groups,
    lighting: Groups,
    traffic_controls: Groups,
    month: Groups,
    day_of_week: Groups,
}

type Groups = BTreeMap<String, Vec<String>>;

/// Every dictionary used by the harmonisers.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub severity: Dictionary<Severity>,
    pub midblock: Dictionary<RoadPosition>,
    pub road_position_horizontal: Dictionary<RoadPositionHorizontal>,
    pub road_position_vertical: Dictionary<RoadPositionVertical>,
    pub road_sealed: Dictionary<SurfaceSealing>,
    pub road_wet: Dictionary<SurfaceMoisture>,
    pub weather: Dictionary<Weather>,
    pub lighting: Dictionary<Lighting>,
    pub traffic_controls: Dictionary<TrafficControls>,
    pub month: Dictionary<Month>,
    pub day_of_week: Dictionary<DayOfWeek>,
}

impl Vocabulary {
    /// Parses a vocabulary from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed, names an unknown canonical
    /// value, or lists one raw term under two canonical values.
    pub fn parse(toml_str: &str) -> Result<Self, VocabularyError> {
        let file: VocabularyFile = toml::de::from_str(toml_str)?;
        Ok(Self {
            severity: Dictionary::from_groups(DictionaryField::Severity, file.severity)?,
            midblock: Dictionary::from_groups(DictionaryField::Midblock, file.road_position)?,
            road_position_horizontal: Dictionary::from_groups(
                DictionaryField::RoadPositionHorizontal,
                file.road_position_horizontal,
            )?,
            road_position_vertical: Dictionary::from_groups(
                DictionaryField::RoadPositionVertical,
                file.road_position_vertical,
            )?,
            road_sealed: Dictionary::from_groups(DictionaryField::RoadSealed, file.road_sealed)?,
            road_wet: Dictionary::from_groups(DictionaryField::RoadWet, file.road_wet)?,
            weather: Dictionary::from_groups(DictionaryField::Weather, file.weather)?,
            lighting: Dictionary::from_groups(DictionaryField::Lighting, file.lighting)?,
            traffic_controls: Dictionary::from_groups(
                DictionaryField::TrafficControls,
                file.traffic_controls,
            )?,
            month: Dictionary::from_groups(DictionaryField::Month, file.month)?,
            day_of_week: Dictionary::from_groups(DictionaryField::DayOfWeek, file.day_of_week)?,
        })
    }

    /// The vocabulary compiled into the binary.
    ///
    /// # Panics
    ///
    /// Panics on first use if the embedded `vocabulary.toml` is malformed.
    #[must_use]
    pub fn embedded() -> &'static Self {
        &EMBEDDED
    }

    /// Whether `raw` is a known term of `field`'s dictionary.
    #[must_use]
    pub fn contains(&self, field: DictionaryField, raw: &str) -> bool {
        match field {
            DictionaryField::Severity => self.severity.contains(raw),
            DictionaryField::Midblock => self.midblock.contains(raw),
            DictionaryField::RoadPositionHorizontal => self.road_position_horizontal.contains(raw),
            DictionaryField::RoadPositionVertical => self.road_position_vertical.contains(raw),
            DictionaryField::RoadSealed => self.road_sealed.contains(raw),
            DictionaryField::RoadWet => self.road_wet.contains(raw),
            DictionaryField::Weather => self.weather.contains(raw),
            DictionaryField::Lighting => self.lighting.contains(raw),
            DictionaryField::TrafficControls => self.traffic_controls.contains(raw),
            DictionaryField::Month => self.month.contains(raw),
            DictionaryField::DayOfWeek => self.day_of_week.contains(raw),
        }
    }
}
