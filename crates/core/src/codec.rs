//! Sort key encoding and comparison
//!
//! Turns a raw field value of a declared type into a `SortKey` that carries
//! its own direction and missing placement, so two keys produced for the
//! same sort field can be compared without any further context.
//!
//! # Ordering rules
//!
//! | Type | Order |
//! |------|-------|
//! | STRING | byte-lexicographic over the sort form |
//! | NUMERIC_INT / NUMERIC_LONG | signed 64-bit integer |
//! | NUMERIC_FLOAT | IEEE-754 total order of the f32-quantized value |
//! | NUMERIC_DOUBLE | IEEE-754 total order |
//! | BOOL | false < true |
//! | DATE | signed epoch milliseconds |
//! | SCORE | IEEE-754 total order |
//!
//! Missing values are placed by `MissingPlacement` alone. Direction only
//! reverses the order among present values.

use crate::field::{FieldType, FieldValue};
use crate::sort::{Direction, MissingPlacement};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Per-document tuple of sort keys, one per sort field
pub type SortKeys = SmallVec<[SortKey; 4]>;

/// An encoded, directly comparable present value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyValue {
    /// Sort-form bytes of a string
    Bytes(Vec<u8>),
    /// Integers and dates
    Int(i64),
    /// Floats (already quantized), doubles and scores
    Float(f64),
    /// Booleans
    Bool(bool),
}

impl KeyValue {
    fn rank(&self) -> u8 {
        match self {
            KeyValue::Bytes(_) => 0,
            KeyValue::Int(_) => 1,
            KeyValue::Float(_) => 2,
            KeyValue::Bool(_) => 3,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Bytes(a), KeyValue::Bytes(b)) => a.cmp(b),
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
            // Only reachable if two shards disagree on the encoding
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
            KeyValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Encoded sort key for one sort field of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    value: Option<KeyValue>,
    direction: Direction,
    missing: MissingPlacement,
}

impl SortKey {
    /// A key for a document lacking the field
    pub fn missing(direction: Direction, missing: MissingPlacement) -> Self {
        SortKey {
            value: None,
            direction,
            missing,
        }
    }

    /// A key for a present value
    pub fn present(value: KeyValue, direction: Direction, missing: MissingPlacement) -> Self {
        SortKey {
            value: Some(value),
            direction,
            missing,
        }
    }

    /// Encoded value, `None` when missing
    pub fn value(&self) -> Option<&KeyValue> {
        self.value.as_ref()
    }

    /// Whether the document lacked the field
    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }

    /// Direction the key was encoded for
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Missing placement the key was encoded for
    pub fn placement(&self) -> MissingPlacement {
        self.missing
    }
}

/// Encode a raw value of a declared type
///
/// `raw = None` encodes a missing value. Values of an incompatible kind
/// (a string in a numeric field, an int field holding a long outside the
/// 32-bit range, ...) are rejected with `InvalidFieldValue`.
pub fn encode(
    raw: Option<&FieldValue>,
    field_type: FieldType,
    direction: Direction,
    missing: MissingPlacement,
) -> Result<SortKey> {
    let Some(raw) = raw else {
        return Ok(SortKey::missing(direction, missing));
    };
    let value = encode_value(raw, field_type)?;
    Ok(SortKey::present(value, direction, missing))
}

/// Encode a relevance score
pub fn encode_score(score: f64, direction: Direction) -> SortKey {
    SortKey::present(KeyValue::Float(score), direction, MissingPlacement::First)
}

fn mismatch(field_type: FieldType, raw: &FieldValue) -> Error {
    Error::InvalidFieldValue {
        field_type: field_type.to_string(),
        reason: format!("cannot encode a {} value", raw.kind()),
    }
}

fn encode_value(raw: &FieldValue, field_type: FieldType) -> Result<KeyValue> {
    let value = match field_type {
        FieldType::String => match raw {
            FieldValue::String(s) => KeyValue::Bytes(s.as_bytes().to_vec()),
            _ => return Err(mismatch(field_type, raw)),
        },
        FieldType::NumericInt => match raw {
            FieldValue::Int(v) => KeyValue::Int(i64::from(*v)),
            FieldValue::Long(v) => {
                let narrowed = i32::try_from(*v).map_err(|_| Error::InvalidFieldValue {
                    field_type: field_type.to_string(),
                    reason: format!("{} is outside the 32-bit range", v),
                })?;
                KeyValue::Int(i64::from(narrowed))
            }
            _ => return Err(mismatch(field_type, raw)),
        },
        FieldType::NumericLong => match raw {
            FieldValue::Int(v) => KeyValue::Int(i64::from(*v)),
            FieldValue::Long(v) => KeyValue::Int(*v),
            _ => return Err(mismatch(field_type, raw)),
        },
        // Stored at float precision: wider inputs are quantized, never corrected
        FieldType::NumericFloat => match raw {
            FieldValue::Float(v) => KeyValue::Float(f64::from(*v)),
            FieldValue::Double(v) => KeyValue::Float(f64::from(*v as f32)),
            FieldValue::Int(v) => KeyValue::Float(f64::from(*v as f32)),
            FieldValue::Long(v) => KeyValue::Float(f64::from(*v as f32)),
            _ => return Err(mismatch(field_type, raw)),
        },
        FieldType::NumericDouble | FieldType::Score => match raw {
            FieldValue::Float(v) => KeyValue::Float(f64::from(*v)),
            FieldValue::Double(v) => KeyValue::Float(*v),
            FieldValue::Int(v) => KeyValue::Float(f64::from(*v)),
            FieldValue::Long(v) => KeyValue::Float(*v as f64),
            _ => return Err(mismatch(field_type, raw)),
        },
        FieldType::Bool => match raw {
            FieldValue::Bool(v) => KeyValue::Bool(*v),
            _ => return Err(mismatch(field_type, raw)),
        },
        FieldType::Date => match raw {
            FieldValue::Date(ms) | FieldValue::Long(ms) => KeyValue::Int(*ms),
            _ => return Err(mismatch(field_type, raw)),
        },
    };
    Ok(value)
}

/// Compare two keys produced for the same sort field
///
/// Placement and direction are taken from `a`.
pub fn compare(a: &SortKey, b: &SortKey) -> Ordering {
    match (&a.value, &b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => match a.missing {
            MissingPlacement::First => Ordering::Less,
            MissingPlacement::Last => Ordering::Greater,
        },
        (Some(_), None) => match a.missing {
            MissingPlacement::First => Ordering::Greater,
            MissingPlacement::Last => Ordering::Less,
        },
        (Some(x), Some(y)) => match a.direction {
            Direction::Asc => x.cmp(y),
            Direction::Desc => y.cmp(x),
        },
    }
}

/// Compare two key tuples field by field; first non-equal result wins
pub fn compare_tuples(a: &[SortKey], b: &[SortKey]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
