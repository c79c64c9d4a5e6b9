#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical road-crash vocabulary.
//!
//! Every jurisdiction's raw category strings are normalized into the
//! enumerations defined here. The string forms (`AsRef<str>`, `Display`,
//! serde) are the values written to the staging tables.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A source jurisdiction feeding the staging model.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Jurisdiction {
    /// South Australia
    Sa,
    /// Victoria
    Vic,
    /// New Zealand
    Nz,
    /// Queensland
    Qld,
    /// Western Australia
    Wa,
    /// Australian Capital Territory
    Act,
}

impl Jurisdiction {
    /// Returns every jurisdiction in merge order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Sa, Self::Vic, Self::Nz, Self::Qld, Self::Wa, Self::Act]
    }

    /// Prefix prepended to the source row identifier to form `crash_id`.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Sa => "SA",
            Self::Vic => "VIC",
            Self::Nz => "NZ",
            Self::Qld => "QLD",
            Self::Wa => "WA",
            Self::Act => "ACT",
        }
    }

    /// ISO country code written to the `country` column.
    #[must_use]
    pub const fn country(self) -> &'static str {
        match self {
            Self::Nz => "NZ",
            Self::Sa | Self::Vic | Self::Qld | Self::Wa | Self::Act => "AU",
        }
    }

    /// State literal written to the `state` column.
    #[must_use]
    pub const fn state(self) -> &'static str {
        self.prefix()
    }
}

/// Canonical crash severity.
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
pub enum Severity {
    PropertyDamage,
    MinorInjury,
    SeriousInjury,
    Fatality,
}

/// Canonical atmospheric condition.
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
pub enum Weather {
    Fine,
    SmokeDust,
    Fog,
    Rain,
    Snow,
    Mist,
    HighWind,
    Overcast,
    Other,
    Unknown,
}

/// Canonical lighting condition.
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
pub enum Lighting {
    Daylight,
    DarknessLit,
    DarknessNotLit,
    DawnDusk,
    Other,
    Unknown,
}

/// Canonical traffic control at the crash site.
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
pub enum TrafficControls {
    /// No control present
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    NoControl,
    StopSign,
    TrafficLights,
    RailwayCrossing,
    GivewaySign,
    PedestrianCrossing,
    SchoolCrossing,
    ManualControl,
    Other,
}

/// Horizontal alignment of the road.
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
pub enum RoadPositionHorizontal {
    Straight,
    CurvedViewOpen,
    CurvedViewObscure,
    Unknown,
}

/// Vertical alignment of the road.
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
pub enum RoadPositionVertical {
    Level,
    Crest,
    Slope,
    Dip,
    Unknown,
}

/// Whether a crash happened midblock or at an intersection.
///
/// The two staging columns `midblock` and `intersection` are both derived
/// from this single value, so they are always complementary.
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
pub enum RoadPosition {
    Midblock,
    Intersection,
}

impl RoadPosition {
    #[must_use]
    pub const fn is_midblock(self) -> bool {
        matches!(self, Self::Midblock)
    }

    #[must_use]
    pub const fn is_intersection(self) -> bool {
        !self.is_midblock()
    }
}

/// Sealed state of the road surface.
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
pub enum SurfaceSealing {
    Sealed,
    Unsealed,
    /// The source explicitly reported the surface as unknown.
    Unknown,
}

impl SurfaceSealing {
    /// Returns `Some(true)` for sealed, `Some(false)` for unsealed and
    /// `None` when the source reported it as unknown.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Sealed => Some(true),
            Self::Unsealed => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Moisture state of the road surface.
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
pub enum SurfaceMoisture {
    Wet,
    Dry,
    /// The source explicitly reported the surface as unknown.
    Unknown,
}

impl SurfaceMoisture {
    /// Returns `Some(true)` for wet, `Some(false)` for dry and `None` when
    /// the source reported it as unknown.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Wet => Some(true),
            Self::Dry => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Calendar month, numbered from 1.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Month {
    January = 1,
    February = 2,
    March = 3,
    April = 4,
    May = 5,
    June = 6,
    July = 7,
    August = 8,
    September = 9,
    October = 10,
    November = 11,
    December = 12,
}

impl Month {
    #[must_use]
    pub const fn number(self) -> u32 {
        self as u32
    }
}

/// Day of the week, numbered from Monday = 1 to Sunday = 7.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DayOfWeek {
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
    Sunday = 7,
}

impl DayOfWeek {
    #[must_use]
    pub const fn number(self) -> u32 {
        self as u32
    }
}

/// The 18 canonical vehicle (unit) buckets.
///
/// Declaration order is the canonical field order: it drives both the
/// staging column order and the fragment order of `vehicles_id`.
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
pub enum VehicleType {
    Animals,
    CarSedan,
    CarUtility,
    CarVan,
    #[serde(rename = "car_4x4")]
    #[strum(serialize = "car_4x4")]
    Car4x4,
    CarStationWagon,
    MotorCycle,
    TruckSmall,
    TruckLarge,
    Bus,
    Taxi,
    Bicycle,
    Scooter,
    Pedestrian,
    Inanimate,
    Train,
    Tram,
    VehicleOther,
}

impl VehicleType {
    /// Number of canonical vehicle buckets.
    pub const COUNT: usize = 18;

    /// Returns every vehicle type in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self; Self::COUNT] {
        &[
            Self::Animals,
            Self::CarSedan,
            Self::CarUtility,
            Self::CarVan,
            Self::Car4x4,
            Self::CarStationWagon,
            Self::MotorCycle,
            Self::TruckSmall,
            Self::TruckLarge,
            Self::Bus,
            Self::Taxi,
            Self::Bicycle,
            Self::Scooter,
            Self::Pedestrian,
            Self::Inanimate,
            Self::Train,
            Self::Tram,
            Self::VehicleOther,
        ]
    }

    /// Short code used when building `vehicles_id`. Case is significant
    /// (`t` is a small truck, `T` a large one).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Animals => "a",
            Self::CarSedan => "c",
            Self::CarUtility => "u",
            Self::CarVan => "v",
            Self::Car4x4 => "f",
            Self::CarStationWagon => "w",
            Self::MotorCycle => "mc",
            Self::TruckSmall => "t",
            Self::TruckLarge => "T",
            Self::Bus => "B",
            Self::Taxi => "x",
            Self::Bicycle => "b",
            Self::Scooter => "s",
            Self::Pedestrian => "p",
            Self::Inanimate => "i",
            Self::Train => "n",
            Self::Tram => "m",
            Self::VehicleOther => "o",
        }
    }

    /// Position of this type in canonical order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}
