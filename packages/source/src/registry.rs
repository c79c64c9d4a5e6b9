//! Jurisdiction registry, loading every definition from embedded TOML.
//!
//! Each `.toml` file in `packages/source/jurisdictions/` is baked into the
//! binary at compile time via [`include_str!`].

use crash_etl_crash_models::Jurisdiction;

use crate::error::DefinitionError;
use crate::source_def::{JurisdictionDefinition, parse_jurisdiction_toml};

/// TOML configs embedded at compile time, in merge order.
const JURISDICTION_TOMLS: &[(&str, &str)] = &[
    ("sa", include_str!("../jurisdictions/sa.toml")),
    ("vic", include_str!("../jurisdictions/vic.toml")),
    ("nz", include_str!("../jurisdictions/nz.toml")),
    ("qld", include_str!("../jurisdictions/qld.toml")),
    ("wa", include_str!("../jurisdictions/wa.toml")),
    ("act", include_str!("../jurisdictions/act.toml")),
];

/// Returns every jurisdiction definition, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed.
#[must_use]
pub fn all_jurisdictions() -> Vec<JurisdictionDefinition> {
    JURISDICTION_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_jurisdiction_toml(toml)
                .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up one definition by its id (`"sa"`, `"vic"`, ...).
///
/// # Errors
///
/// Returns [`DefinitionError::UnknownJurisdiction`] if no definition has
/// that id, or [`DefinitionError::Parse`] if its TOML is malformed.
pub fn find(id: &str) -> Result<JurisdictionDefinition, DefinitionError> {
    let jurisdiction: Jurisdiction = id
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| DefinitionError::UnknownJurisdiction(id.to_string()))?;
    let (_, toml) = JURISDICTION_TOMLS
        .iter()
        .find(|(name, _)| *name == jurisdiction.as_ref())
        .ok_or_else(|| DefinitionError::UnknownJurisdiction(id.to_string()))?;
    parse_jurisdiction_toml(toml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_every_jurisdiction_in_merge_order() {
        let ids: Vec<Jurisdiction> = all_jurisdictions().iter().map(|d| d.id).collect();
        assert_eq!(ids, Jurisdiction::all());
    }

    #[test]
    fn file_names_match_ids() {
        for ((name, _), def) in JURISDICTION_TOMLS.iter().zip(all_jurisdictions()) {
            assert_eq!(*name, def.id.as_ref());
        }
    }

    #[test]
    fn prefixes_are_unique() {
        let mut prefixes: Vec<&str> = all_jurisdictions().iter().map(|d| d.id.prefix()).collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        assert_eq!(prefixes.len(), JURISDICTION_TOMLS.len());
    }

    #[test]
    fn every_definition_has_a_row_id_and_location() {
        for def in &all_jurisdictions() {
            assert!(!def.name.is_empty(), "{}: no name", def.id);
            assert!(!def.row_id.is_empty(), "{}: no row id", def.id);
            assert!(def.location.lat_long.is_some(), "{}: no lat_long", def.id);
            assert!(def.description.severity.is_some(), "{}: no severity", def.id);
        }
    }

    #[test]
    fn grid_sources_project_into_calculated_columns() {
        for id in ["sa", "vic"] {
            let def = find(id).unwrap();
            assert!(def.projection.is_some());
            let pair = def.location.lat_long.as_ref().unwrap();
            assert_eq!(pair.latitude, "calc_lat");
            assert_eq!(pair.longitude, "calc_long");
        }
    }

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find("VIC").unwrap().id, Jurisdiction::Vic);
        assert!(matches!(
            find("tas"),
            Err(DefinitionError::UnknownJurisdiction(_))
        ));
    }
}
