//! Cell values.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A geographic coordinate pair in WGS84 degrees.
///
/// Rendered as `(latitude, longitude)`; this rendering is the `lat_long`
/// key of the Location table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for LatLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// A single cell.
///
/// [`Value::Null`] means the source has no data for the field.
/// [`Value::Unknown`] means the source explicitly reported the value as
/// unknown; the two are never collapsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Unknown,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    LatLong(LatLong),
}

impl Value {
    /// Creates a text value, mapping empty (or whitespace-only) strings to
    /// [`Value::Null`].
    #[must_use]
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim().is_empty() {
            Self::Null
        } else {
            Self::Text(raw)
        }
    }

    /// Maps `None` to [`Value::Unknown`], used for tri-state surface fields.
    #[must_use]
    pub const fn tri_state(value: Option<bool>) -> Self {
        match value {
            Some(b) => Self::Bool(b),
            None => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the trimmed text form of textual and numeric cells.
    ///
    /// Numeric cells are included so that identifiers read from columnar
    /// files (integers) and from delimited text (strings) behave alike.
    #[must_use]
    pub fn as_raw(&self) -> Option<String> {
        match self {
            Self::Null | Self::Unknown => None,
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Int(i) => Some(i.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::LatLong(ll) => Some(ll.to_string()),
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Renders the cell for delimited-text output. `Null` renders as
    /// `None` (an empty field).
    #[must_use]
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Unknown => Some("unknown".to_string()),
            Self::Text(s) => Some(s.clone()),
            other => other.as_raw(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Unknown, Self::Unknown) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::LatLong(a), Self::LatLong(b)) => {
                a.latitude.to_bits() == b.latitude.to_bits()
                    && a.longitude.to_bits() == b.longitude.to_bits()
            }
            _ => false,
        }
    }
}

// Floats compare by bit pattern so that rows can be deduplicated.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null | Self::Unknown => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::LatLong(ll) => {
                ll.latitude.to_bits().hash(state);
                ll.longitude.to_bits().hash(state);
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_null() {
        assert!(Value::text("").is_null());
        assert!(Value::text("   ").is_null());
        assert_eq!(Value::text("Fine"), Value::Text("Fine".to_string()));
    }

    #[test]
    fn unknown_is_distinct_from_null() {
        assert_ne!(Value::tri_state(None), Value::Null);
        assert_eq!(Value::tri_state(Some(false)), Value::Bool(false));
        assert_eq!(Value::Unknown.render().as_deref(), Some("unknown"));
        assert_eq!(Value::Null.render(), None);
    }

    #[test]
    fn lat_long_renders_as_pair() {
        let ll = LatLong {
            latitude: -34.9,
            longitude: 138.6,
        };
        assert_eq!(ll.to_string(), "(-34.9, 138.6)");
    }

    #[test]
    fn equal_floats_hash_equal() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        set.insert(Value::Float(1.5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn as_raw_trims_and_stringifies() {
        assert_eq!(Value::text(" 12 ").as_raw().as_deref(), Some("12"));
        assert_eq!(Value::Int(7).as_raw().as_deref(), Some("7"));
        assert_eq!(Value::Null.as_raw(), None);
    }
}
