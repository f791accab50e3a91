//! Field types and raw field values
//!
//! `FieldType` is the declared type of a stored field (plus the `Score`
//! pseudo-type). `FieldValue` is a raw value as read from a document,
//! before it is encoded into a sort key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// UTF-8 text, sorted by its sort-form bytes
    String,
    /// 32-bit signed integer
    NumericInt,
    /// 64-bit signed integer
    NumericLong,
    /// 32-bit IEEE-754 float
    NumericFloat,
    /// 64-bit IEEE-754 float
    NumericDouble,
    /// Boolean, false before true
    Bool,
    /// UTC instant, stored as epoch milliseconds
    Date,
    /// Relevance score; never stored
    Score,
}

/// Comparable families of field types
///
/// Two indices may disagree on the exact declared type of a field as long
/// as both types belong to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// String
    Text,
    /// NumericInt, NumericLong
    Integer,
    /// NumericFloat, NumericDouble
    Floating,
    /// Bool
    Boolean,
    /// Date
    Temporal,
    /// Score
    Relevance,
}

impl FieldType {
    /// All stored field types (excludes `Score`)
    pub const STORED: [FieldType; 7] = [
        FieldType::String,
        FieldType::NumericInt,
        FieldType::NumericLong,
        FieldType::NumericFloat,
        FieldType::NumericDouble,
        FieldType::Bool,
        FieldType::Date,
    ];

    /// Family this type compares within
    pub fn family(self) -> TypeFamily {
        match self {
            FieldType::String => TypeFamily::Text,
            FieldType::NumericInt | FieldType::NumericLong => TypeFamily::Integer,
            FieldType::NumericFloat | FieldType::NumericDouble => TypeFamily::Floating,
            FieldType::Bool => TypeFamily::Boolean,
            FieldType::Date => TypeFamily::Temporal,
            FieldType::Score => TypeFamily::Relevance,
        }
    }

    /// Whether values of this type are numbers
    pub fn is_numeric(self) -> bool {
        matches!(self.family(), TypeFamily::Integer | TypeFamily::Floating)
    }

    /// The wider of two types in the same family, `None` across families
    ///
    /// Used when one sort field resolves to different declared types in
    /// different indices.
    pub fn widen(self, other: FieldType) -> Option<FieldType> {
        if self.family() != other.family() {
            return None;
        }
        Some(match (self, other) {
            (FieldType::NumericLong, _) | (_, FieldType::NumericLong) => FieldType::NumericLong,
            (FieldType::NumericDouble, _) | (_, FieldType::NumericDouble) => {
                FieldType::NumericDouble
            }
            _ => self,
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "STRING",
            FieldType::NumericInt => "NUMERIC_INT",
            FieldType::NumericLong => "NUMERIC_LONG",
            FieldType::NumericFloat => "NUMERIC_FLOAT",
            FieldType::NumericDouble => "NUMERIC_DOUBLE",
            FieldType::Bool => "BOOL",
            FieldType::Date => "DATE",
            FieldType::Score => "SCORE",
        };
        f.write_str(name)
    }
}

/// A raw field value from a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    /// Text
    String(String),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Bool(bool),
    /// Epoch milliseconds, UTC
    Date(i64),
}

impl FieldValue {
    /// Build a date value from a UTC timestamp
    pub fn date(at: DateTime<Utc>) -> Self {
        FieldValue::Date(at.timestamp_millis())
    }

    /// Short name of the value kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Long(_) => "long",
            FieldValue::Float(_) => "float",
            FieldValue::Double(_) => "double",
            FieldValue::Bool(_) => "bool",
            FieldValue::Date(_) => "date",
        }
    }

    /// Borrow the text if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(at: DateTime<Utc>) -> Self {
        FieldValue::date(at)
    }
}
