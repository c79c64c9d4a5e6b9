#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Jurisdiction definitions and the crash harmonisation pipeline.
//!
//! Each jurisdiction is described by a declarative
//! [`JurisdictionDefinition`] (embedded TOML, see [`registry`]). The
//! [`ExtractLoader`] reads its raw files into a [`Table`] and one generic
//! [`Harmoniser`] maps that table onto the canonical crash record using the
//! [`Vocabulary`] dictionaries, the identifier generators and the
//! structure checker.
//!
//! [`Table`]: crash_etl_source_models::Table

pub mod audit;
pub mod error;
pub mod harmonise;
pub mod identifiers;
pub mod loader;
pub mod parsing;
pub mod progress;
pub mod projection;
pub mod registry;
pub mod source_def;
pub mod structure;
pub mod vocabulary;

pub use audit::{VocabularyAudit, audit_vocabulary};
pub use error::{
    DefinitionError, FieldCoercionError, HarmoniseError, LoadError, ProjectionError,
    UnmappedValueError,
};
pub use harmonise::{CoercionPolicy, HarmoniseOutcome, HarmoniseReport, Harmoniser};
pub use loader::ExtractLoader;
pub use projection::{CoordinateProjector, Proj4Projector, ProjectionName};
pub use source_def::{JurisdictionDefinition, parse_jurisdiction_toml};
pub use structure::{CheckMode, StructureReport, check_structure};
pub use vocabulary::{DictionaryField, Vocabulary};
