#![forbid(unsafe_code)]

//! Attribute values.
//!
//! The data graph exposes tracked attributes as loosely typed values; the
//! change funnel and the notifier payloads both carry [`AttrValue`] so that
//! undo closures and observers see the same representation.

use std::fmt;

/// A tracked attribute value.
///
/// `None` models an unset attribute; writing `None` clears it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    /// Attribute is unset.
    #[default]
    None,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point (chemical shifts, intensities).
    Float(f64),
    /// Free text (names, comments, isotope codes).
    Str(String),
}

impl AttrValue {
    /// True when the attribute is unset.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Borrow the text payload, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("<none>"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
