//! Vocabulary totality audit.
//!
//! Lists every raw term an extract contains that its dictionary lacks,
//! so gaps can be fixed before a run fails on them.

use std::collections::BTreeMap;

use crash_etl_crash_models::Jurisdiction;
use crash_etl_source_models::Table;
use serde::Serialize;

use crate::source_def::{DateTimeStrategy, JurisdictionDefinition, LookupField};
use crate::vocabulary::{DictionaryField, Vocabulary};

/// Unmapped terms found in one jurisdiction's extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VocabularyAudit {
    pub jurisdiction: Jurisdiction,
    /// Raw cells examined across all dictionary-backed fields.
    pub cells_checked: usize,
    /// Per field, each unmapped raw term with its number of occurrences.
    /// A missing cell without a default is recorded as the empty term.
    pub gaps: BTreeMap<DictionaryField, BTreeMap<String, usize>>,
}

impl VocabularyAudit {
    /// Whether every observed term is mapped.
    #[must_use]
    pub fn is_total(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Number of distinct unmapped terms across all fields.
    #[must_use]
    pub fn distinct_gaps(&self) -> usize {
        self.gaps.values().map(BTreeMap::len).sum()
    }
}

/// Checks every dictionary-backed column of `raw` against `vocabulary`.
#[must_use]
pub fn audit_vocabulary(
    definition: &JurisdictionDefinition,
    vocabulary: &Vocabulary,
    raw: &Table,
) -> VocabularyAudit {
    let mut lookups: Vec<(DictionaryField, &LookupField)> = definition
        .description
        .lookups()
        .into_iter()
        .filter(|(_, lookup)| lookup.equals.is_none())
        .collect();
    if let DateTimeStrategy::Coded {
        month, day_of_week, ..
    } = &definition.date_time
    {
        lookups.extend(month.iter().map(|m| (DictionaryField::Month, m)));
        lookups.extend(day_of_week.iter().map(|d| (DictionaryField::DayOfWeek, d)));
    }

    let mut gaps: BTreeMap<DictionaryField, BTreeMap<String, usize>> = BTreeMap::new();
    let mut cells_checked = 0;
    for (field, lookup) in lookups {
        for row in 0..raw.len() {
            cells_checked += 1;
            let term = lookup.raw(raw, row).unwrap_or_default();
            if !vocabulary.contains(field, &term) {
                *gaps.entry(field).or_default().entry(term).or_default() += 1;
            }
        }
    }

    for (field, terms) in &gaps {
        log::warn!(
            "[{}] {field}: {} unmapped term(s): {}",
            definition.id.prefix(),
            terms.len(),
            terms
                .iter()
                .map(|(term, count)| format!("{term:?} x{count}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    VocabularyAudit {
        jurisdiction: definition.id,
        cells_checked,
        gaps,
    }
}

#[cfg(test)]
mod tests {
    use crash_etl_source_models::Value;

    use super::*;
    use crate::source_def::parse_jurisdiction_toml;

    const SA: &str = r#"
        id = "sa"
        name = "South Australia"
        row_id = "REPORT_ID"

        [extract]
        path = "crash.csv"

        [description]
        weather = "Weather Cond"

        [date_time]
        type = "coded"
        year = "Year"
        month = "Month"
        day_of_week = "Day"
    "#;

    fn raw() -> Table {
        let mut t = Table::new(&["REPORT_ID", "Weather Cond", "Month", "Day"]);
        for (weather, month, day) in [
            ("Raining", "January", "Monday"),
            ("Hail", "January", "Moonday"),
            ("Hail", "Febuary", ""),
        ] {
            t.push_row(vec![
                Value::text("1"),
                Value::text(weather),
                Value::text(month),
                Value::text(day),
            ]);
        }
        t
    }

    #[test]
    fn reports_unmapped_terms_with_counts() {
        let def = parse_jurisdiction_toml(SA).unwrap();
        let audit = audit_vocabulary(&def, Vocabulary::embedded(), &raw());
        assert!(!audit.is_total());
        assert_eq!(audit.cells_checked, 9);
        assert_eq!(audit.gaps[&DictionaryField::Weather]["Hail"], 2);
        assert_eq!(audit.gaps[&DictionaryField::Month]["Febuary"], 1);
        let days = &audit.gaps[&DictionaryField::DayOfWeek];
        assert_eq!(days["Moonday"], 1);
        assert_eq!(days[""], 1);
        assert_eq!(audit.distinct_gaps(), 4);
    }

    #[test]
    fn fully_mapped_extract_is_total() {
        let def = parse_jurisdiction_toml(SA).unwrap();
        let mut t = raw();
        t.retain_rows(|row| row == 0);
        assert!(audit_vocabulary(&def, Vocabulary::embedded(), &t).is_total());
    }
}
