//! Sort specification resolution
//!
//! Resolves client `SortRequest`s against one schema snapshot per targeted
//! index. Resolution happens once per query, before any shard is contacted,
//! so every schema error is reported without a wasted fan-out.
//!
//! # Multi-index rules
//!
//! - An index that lacks a sort field contributes documents that are
//!   *missing* for that field. This is not an error.
//! - An index where the field exists but is index-only fails the query
//!   with `UnsortableField`.
//! - All indices that have the field must agree on its type family
//!   (integers with integers, floats with floats, ...). The effective type
//!   is the widest declared type.

use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    Error, FieldSchema, FieldType, Result, SortBinding, SortField, SortLookup, SortRequest,
    SortSpec, SCORE_FIELD,
};
use tracing::debug;

/// Resolve `requests` against `schemas` (keyed by index name)
///
/// An empty request list resolves to relevance order (score descending).
pub fn resolve(
    requests: &[SortRequest],
    schemas: &BTreeMap<String, Arc<FieldSchema>>,
) -> Result<SortSpec> {
    let versions: BTreeMap<String, u64> = schemas
        .iter()
        .map(|(index, schema)| (index.clone(), schema.version))
        .collect();

    if requests.is_empty() {
        return Ok(SortSpec::by_score(versions));
    }

    let fields = requests
        .iter()
        .map(|request| resolve_field(request, schemas))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        target: "tessera::resolve",
        fields = fields.len(),
        indices = schemas.len(),
        "Sort specification resolved"
    );
    SortSpec::new(fields, versions)
}

fn resolve_field(
    request: &SortRequest,
    schemas: &BTreeMap<String, Arc<FieldSchema>>,
) -> Result<SortField> {
    if request.field == SCORE_FIELD {
        return Ok(SortField::score(request.direction));
    }

    let mut bindings: BTreeMap<String, Option<SortBinding>> = BTreeMap::new();
    for (index, schema) in schemas {
        let binding = match &request.normalized_alias {
            Some(alias) => schema.lookup_alias(&request.field, alias),
            None => match schema.lookup_sort(&request.field) {
                SortLookup::Bound(binding) => Some(binding),
                SortLookup::NotSortable(config) => {
                    return Err(Error::unsortable(
                        &request.field,
                        index,
                        format!("{} field is index-only", config.stored_type),
                    ));
                }
                SortLookup::Absent => None,
            },
        };
        bindings.insert(index.clone(), binding);
    }

    if let Some(alias) = &request.normalized_alias {
        if bindings.values().all(Option::is_none) {
            return Err(Error::UnknownSortAlias {
                field: request.field.clone(),
                alias: alias.clone(),
            });
        }
    }

    let effective_type = effective_type(&request.field, &bindings)?;

    Ok(SortField {
        field_name: request.field.clone(),
        direction: request.direction,
        missing: request.missing.unwrap_or_default(),
        effective_type,
        normalized_alias: request.normalized_alias.clone(),
        bindings,
    })
}

/// Widest type across every index that binds the field
///
/// A field absent everywhere sorts every document as missing; its type is
/// then irrelevant and reported as `String`.
fn effective_type(
    field: &str,
    bindings: &BTreeMap<String, Option<SortBinding>>,
) -> Result<FieldType> {
    let mut resolved: Option<(FieldType, &str)> = None;
    for (index, binding) in bindings {
        let Some(binding) = binding else { continue };
        resolved = match resolved {
            None => Some((binding.stored_type, index.as_str())),
            Some((current, first_index)) => match current.widen(binding.stored_type) {
                Some(widened) => Some((widened, first_index)),
                None => {
                    return Err(Error::unsortable(
                        field,
                        index,
                        format!(
                            "declared {} here but {} in '{}'",
                            binding.stored_type, current, first_index
                        ),
                    ));
                }
            },
        };
    }
    Ok(resolved.map(|(t, _)| t).unwrap_or(FieldType::String))
}
