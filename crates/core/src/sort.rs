//! Sort requests and resolved sort specifications
//!
//! A `SortRequest` is what a client asks for: a name, a direction and an
//! optional missing-value placement. The resolver turns a list of them into
//! a `SortSpec`, where each `SortField` knows its effective type and how to
//! read its value in every targeted index.

use crate::field::FieldType;
use crate::schema::{SortBinding, SCORE_FIELD};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sort direction among present values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

/// Where documents lacking the sort field are placed
///
/// Independent of `Direction`: `First` puts missing documents before every
/// present value for ascending and descending sorts alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MissingPlacement {
    /// Missing before present (default)
    #[default]
    First,
    /// Missing after present
    Last,
}

/// One client-supplied sort field, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    /// Sort name, field name, alias name or `_score`
    pub field: String,
    /// Direction, ascending by default
    #[serde(default)]
    pub direction: Direction,
    /// Missing placement, `First` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingPlacement>,
    /// Sort by this normalized alias of `field` instead of its primary form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_alias: Option<String>,
}

impl SortRequest {
    /// Ascending, missing first
    pub fn new(field: impl Into<String>) -> Self {
        SortRequest {
            field: field.into(),
            direction: Direction::Asc,
            missing: None,
            normalized_alias: None,
        }
    }

    /// Sort by relevance score
    pub fn score() -> Self {
        SortRequest::new(SCORE_FIELD)
    }

    /// Builder: ascending
    pub fn ascending(mut self) -> Self {
        self.direction = Direction::Asc;
        self
    }

    /// Builder: descending
    pub fn descending(mut self) -> Self {
        self.direction = Direction::Desc;
        self
    }

    /// Builder: missing values first
    pub fn missing_first(mut self) -> Self {
        self.missing = Some(MissingPlacement::First);
        self
    }

    /// Builder: missing values last
    pub fn missing_last(mut self) -> Self {
        self.missing = Some(MissingPlacement::Last);
        self
    }

    /// Builder: sort by a normalized alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.normalized_alias = Some(alias.into());
        self
    }
}

/// One resolved, encodable sort field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Requested name (kept for diagnostics and result rendering)
    pub field_name: String,
    /// Direction among present values
    pub direction: Direction,
    /// Placement of missing values
    pub missing: MissingPlacement,
    /// Type the values are compared as
    pub effective_type: FieldType,
    /// Alias name when sorting by a normalized form
    pub normalized_alias: Option<String>,
    /// Per-index binding; `None` means the index lacks the field and all
    /// of its documents are missing for this sort field
    pub bindings: BTreeMap<String, Option<SortBinding>>,
}

impl SortField {
    /// The relevance score pseudo-field
    pub fn score(direction: Direction) -> Self {
        SortField {
            field_name: SCORE_FIELD.to_string(),
            direction,
            missing: MissingPlacement::First,
            effective_type: FieldType::Score,
            normalized_alias: None,
            bindings: BTreeMap::new(),
        }
    }

    /// Whether this is the score pseudo-field
    pub fn is_score(&self) -> bool {
        self.effective_type == FieldType::Score
    }

    /// How to read this field inside `index`, if the index has it
    pub fn binding(&self, index: &str) -> Option<&SortBinding> {
        self.bindings.get(index).and_then(Option::as_ref)
    }
}

/// Ordered, non-empty compound sort specification
///
/// Ties are broken in field order, then by `(unique_id, source_index,
/// source_shard)` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    fields: Vec<SortField>,
    /// Schema version each target index was resolved against
    schema_versions: BTreeMap<String, u64>,
}

impl SortSpec {
    /// Create a spec; fails if `fields` is empty
    pub fn new(fields: Vec<SortField>, schema_versions: BTreeMap<String, u64>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidSchema(
                "a sort specification needs at least one field".to_string(),
            ));
        }
        Ok(SortSpec {
            fields,
            schema_versions,
        })
    }

    /// Relevance order, highest score first
    pub fn by_score(schema_versions: BTreeMap<String, u64>) -> Self {
        SortSpec {
            fields: vec![SortField::score(Direction::Desc)],
            schema_versions,
        }
    }

    /// Sort fields in precedence order
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Number of sort fields (and of keys in every document's tuple)
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema version `index` was resolved against
    pub fn schema_version(&self, index: &str) -> Option<u64> {
        self.schema_versions.get(index).copied()
    }

    /// Indices this spec was resolved for
    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.schema_versions.keys().map(String::as_str)
    }
}
