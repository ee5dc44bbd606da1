#![forbid(unsafe_code)]

//! Project identifiers.
//!
//! A [`Pid`] is the stable, parseable, hierarchical name of one wrapped
//! object: a short type code, a `:`, then `.`-separated fields tracing the
//! object's position in the data tree (`NR:A.1` names residue `1` in chain
//! `A`). Fields may be empty: an unset chain position renders as an empty
//! segment between separators.
//!
//! # Invariants
//!
//! 1. The type code is never empty and never contains `.`, `:`, or `\`.
//! 2. A `Pid` always has at least one field (possibly the empty string).
//! 3. `Pid::parse(pid.to_string()) == pid` for every constructed `Pid`
//!    (round-trip law). Literal `.`, `:`, and `\` inside a field are
//!    backslash-escaped on format and required to be escaped on parse.
//! 4. Equality and hashing are structural, so a `Pid` can key the reverse
//!    index that maps identifiers back to wrapper handles.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

/// Character that introduces an escape inside a field.
const ESCAPE: char = '\\';
/// Separator between the type code and the first field.
const TYPE_SEP: char = ':';
/// Separator between fields.
const FIELD_SEP: char = '.';

/// Inline storage for the common case of shallow hierarchies.
type Fields = SmallVec<[String; 4]>;

/// Errors produced while parsing a textual identifier.
///
/// All variants are recoverable: callers reject the input and carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidParseError {
    /// No `:` separating the type code from the fields.
    MissingTypeSeparator,
    /// The text before `:` was empty.
    EmptyTypeCode,
    /// The type code contained a separator or the escape character.
    InvalidTypeCode { found: char },
    /// A field contained a raw `:`; it must be written `\:`.
    UnescapedSeparator { index: usize },
    /// The text ended in the middle of an escape sequence.
    DanglingEscape,
    /// `\` was followed by a character that is not `.`, `:`, or `\`.
    UnknownEscape { found: char },
}

impl fmt::Display for PidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTypeSeparator => write!(f, "missing ':' after type code"),
            Self::EmptyTypeCode => write!(f, "empty type code"),
            Self::InvalidTypeCode { found } => {
                write!(f, "type code contains reserved character '{found}'")
            }
            Self::UnescapedSeparator { index } => {
                write!(f, "unescaped ':' inside field at byte {index}")
            }
            Self::DanglingEscape => write!(f, "dangling escape at end of input"),
            Self::UnknownEscape { found } => {
                write!(f, "unknown escape sequence '\\{found}'")
            }
        }
    }
}

impl std::error::Error for PidParseError {}

/// Short class tag of a wrapped object (`MO`, `SP`, `NR`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(Box<str>);

impl TypeCode {
    /// Create a type code, rejecting empty text and reserved characters.
    pub fn new(code: impl AsRef<str>) -> Result<Self, PidParseError> {
        let code = code.as_ref();
        if code.is_empty() {
            return Err(PidParseError::EmptyTypeCode);
        }
        if let Some(found) = code.chars().find(|c| is_reserved(*c)) {
            return Err(PidParseError::InvalidTypeCode { found });
        }
        Ok(Self(code.into()))
    }

    /// The textual form of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TypeCode {
    type Err = PidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A project identifier: type code plus ordered field path.
///
/// Immutable after construction; renames build a new `Pid` via
/// [`Pid::with_fields`] or [`Pid::with_last_field`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid {
    type_code: TypeCode,
    fields: Fields,
}

impl Pid {
    /// Build a `Pid` from a type code and field path.
    ///
    /// An empty field list is normalized to a single empty field so that
    /// every `Pid` has a canonical textual form.
    #[must_use]
    pub fn new<I, S>(type_code: TypeCode, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Fields = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            fields.push(String::new());
        }
        Self { type_code, fields }
    }

    /// Parse a textual identifier.
    pub fn parse(text: &str) -> Result<Self, PidParseError> {
        let sep = text
            .find(TYPE_SEP)
            .ok_or(PidParseError::MissingTypeSeparator)?;
        let type_code = TypeCode::new(&text[..sep])?;
        let fields = parse_fields(&text[sep + 1..])?;
        Ok(Self { type_code, fields })
    }

    /// The class tag.
    #[must_use]
    pub fn type_code(&self) -> &TypeCode {
        &self.type_code
    }

    /// The ordered field path.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The last field, which is the object's own key under its parent.
    #[must_use]
    pub fn last_field(&self) -> &str {
        self.fields.last().map(String::as_str).unwrap_or("")
    }

    /// Pure constructor replacing the whole field path.
    #[must_use]
    pub fn with_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(self.type_code.clone(), fields)
    }

    /// Pure constructor replacing only the final field (rename).
    #[must_use]
    pub fn with_last_field(&self, key: impl Into<String>) -> Self {
        let mut fields = self.fields.clone();
        if let Some(last) = fields.last_mut() {
            *last = key.into();
        }
        Self {
            type_code: self.type_code.clone(),
            fields,
        }
    }

    /// Derive a child identifier: the child's own type code, this `Pid`'s
    /// fields extended with the child's local key.
    #[must_use]
    pub fn child(&self, type_code: TypeCode, key: impl Into<String>) -> Self {
        let mut fields = self.fields.clone();
        fields.push(key.into());
        Self { type_code, fields }
    }

    /// Number of fields in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.type_code, TYPE_SEP)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            for c in field.chars() {
                if is_reserved(c) {
                    write!(f, "{ESCAPE}")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Pid {
    type Err = PidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_reserved(c: char) -> bool {
    c == FIELD_SEP || c == TYPE_SEP || c == ESCAPE
}

/// Scan the remainder after `:` into unescaped fields.
fn parse_fields(text: &str) -> Result<Fields, PidParseError> {
    let mut fields = Fields::new();
    let mut current = String::new();
    let mut chars = text.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some((_, escaped)) if is_reserved(escaped) => current.push(escaped),
                Some((_, found)) => return Err(PidParseError::UnknownEscape { found }),
                None => return Err(PidParseError::DanglingEscape),
            },
            FIELD_SEP => fields.push(std::mem::take(&mut current)),
            TYPE_SEP => return Err(PidParseError::UnescapedSeparator { index }),
            _ => current.push(c),
        }
    }
    fields.push(current);
    Ok(fields)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
