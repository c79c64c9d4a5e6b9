//! Row-major table addressed by column name.

use std::collections::{BTreeMap, HashSet};

use crate::value::Value;

static NULL: Value = Value::Null;

/// A set of rows sharing one ordered list of named columns.
///
/// Rows are always exactly as wide as the column list. Looking up a column
/// that does not exist yields [`Value::Null`] rather than an error; callers
/// that need to know about missing columns use the structure checker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    index: BTreeMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates an empty table with the given columns. Duplicate column
    /// names keep their first position.
    #[must_use]
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut table = Self::default();
        for column in columns {
            table.ensure_column(column.as_ref());
        }
        table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Appends a row, padding with nulls or truncating to the table width.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Appends a row given as `(column, value)` pairs. Unknown columns are
    /// added to the table.
    pub fn push_named<S: AsRef<str>>(&mut self, cells: impl IntoIterator<Item = (S, Value)>) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (name, value) in cells {
            let idx = self.ensure_column(name.as_ref());
            if idx >= row.len() {
                row.resize(idx + 1, Value::Null);
            }
            row[idx] = value;
        }
        self.push_row(row);
    }

    /// Returns the cell at `row` in `column`, or [`Value::Null`] when either
    /// is out of range.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> &Value {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .unwrap_or(&NULL)
    }

    /// Iterates the values of one column. A missing column yields
    /// [`Value::Null`] for every row.
    pub fn column_values<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(column);
        self.rows
            .iter()
            .map(move |row| idx.and_then(|i| row.get(i)).unwrap_or(&NULL))
    }

    /// Sets (or replaces) a whole column. `values` shorter than the table is
    /// padded with nulls; longer input is truncated.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        let idx = self.ensure_column(name);
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row[idx] = values.next().unwrap_or(Value::Null);
        }
    }

    /// Adds a column filled with `value` unless the column already exists.
    pub fn add_constant_column(&mut self, name: &str, value: &Value) {
        if !self.has_column(name) {
            let idx = self.ensure_column(name);
            for row in &mut self.rows {
                row[idx] = value.clone();
            }
        }
    }

    /// Returns a new table containing exactly `columns` in that order.
    /// Columns absent from `self` are filled with nulls.
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Self {
        let mut out = Self::new(columns);
        let sources: Vec<Option<usize>> = out
            .columns
            .iter()
            .map(|c| self.column_index(c))
            .collect();
        out.rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.and_then(|i| row.get(i)).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        out
    }

    /// Keeps only the rows for which `keep(row_index)` is true.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mut i = 0;
        self.rows.retain(|_| {
            let k = keep(i);
            i += 1;
            k
        });
    }

    /// Removes exact-duplicate rows, keeping first occurrences in order.
    /// Returns the number of rows removed.
    pub fn dedup(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Concatenates tables by column name. The output columns are the
    /// first table's columns followed by any new columns from later tables
    /// in order of appearance.
    #[must_use]
    pub fn concat(tables: Vec<Self>) -> Self {
        let mut out = Self::default();
        for table in &tables {
            for column in &table.columns {
                out.ensure_column(column);
            }
        }
        let width = out.columns.len();
        for table in tables {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .filter_map(|c| out.column_index(c))
                .collect();
            for row in table.rows {
                let mut wide = vec![Value::Null; width];
                for (value, &pos) in row.into_iter().zip(&positions) {
                    wide[pos] = value;
                }
                out.rows.push(wide);
            }
        }
        out
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        idx
    }
}
