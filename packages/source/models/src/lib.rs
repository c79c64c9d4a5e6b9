#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tabular record types shared by the loaders, the harmonisers and the
//! staging writers, plus the canonical staging schema.
//!
//! A [`Table`] is a row-major set of [`Value`]s addressed by column name.
//! Raw extracts, harmonised per-jurisdiction output and the six final
//! staging tables are all represented this way.

pub mod schema;
pub mod table;
pub mod value;

pub use schema::{
    CANONICAL_FIELDS, Column, ColumnKind, OutputTable, VEHICLE_FIELDS, canonical_column,
    canonical_field_names,
};
pub use table::Table;
pub use value::{LatLong, Value};
