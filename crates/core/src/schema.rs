//! Versioned per-index field schema
//!
//! `FieldSchema` is the read-only view of an index's field mappings that the
//! merge core resolves sort requests against. The schema registry owns it;
//! the core only ever reads snapshots, and the reindex coordinator is the
//! only component that installs a new version.
//!
//! Every sortable field exposes one primary sort name (the field name unless
//! overridden, e.g. `id` sorted as `theId`) and optionally one normalized
//! alias, a second string sort form computed at index time.

use crate::field::FieldType;
use crate::normalize::StringHandling;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reserved sort name for the relevance score
pub const SCORE_FIELD: &str = "_score";

/// A derived, differently-normalized sort form of a string field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortAlias {
    /// Name the alias is sorted by
    pub name: String,
    /// Normalization applied to the field value
    pub handling: StringHandling,
}

/// Mapping of one stored field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Stored field name
    pub field_name: String,
    /// Declared type
    pub stored_type: FieldType,
    /// Whether sort-key material is generated for this field
    #[serde(default)]
    pub sortable: bool,
    /// Sort name, when different from the field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field_name: Option<String>,
    /// Optional normalized alias (string fields only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_alias: Option<SortAlias>,
}

impl FieldConfig {
    /// An index-only field (searchable, not sortable)
    pub fn new(field_name: impl Into<String>, stored_type: FieldType) -> Self {
        FieldConfig {
            field_name: field_name.into(),
            stored_type,
            sortable: false,
            sort_field_name: None,
            normalized_alias: None,
        }
    }

    /// Builder: make the field sortable under its own name
    pub fn sort(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Builder: make the field sortable under a different name
    pub fn sort_as(mut self, sort_field_name: impl Into<String>) -> Self {
        self.sortable = true;
        self.sort_field_name = Some(sort_field_name.into());
        self
    }

    /// Builder: add a normalized alias
    pub fn sort_alias(mut self, handling: StringHandling, name: impl Into<String>) -> Self {
        self.normalized_alias = Some(SortAlias {
            name: name.into(),
            handling,
        });
        self
    }

    /// Name this field is sorted by
    pub fn sort_name(&self) -> &str {
        self.sort_field_name.as_deref().unwrap_or(&self.field_name)
    }

    fn primary_binding(&self) -> SortBinding {
        SortBinding {
            source_field: self.field_name.clone(),
            sort_field_name: self.sort_name().to_string(),
            stored_type: self.stored_type,
            handling: StringHandling::Standard,
        }
    }

    fn alias_binding(&self, alias: &SortAlias) -> SortBinding {
        SortBinding {
            source_field: self.field_name.clone(),
            sort_field_name: alias.name.clone(),
            stored_type: self.stored_type,
            handling: alias.handling,
        }
    }
}

/// How one encodable sort field is produced inside one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortBinding {
    /// Stored field the value is read from
    pub source_field: String,
    /// Schema-managed sort name
    pub sort_field_name: String,
    /// Declared type of the source field
    pub stored_type: FieldType,
    /// String normalization (Standard for non-alias bindings)
    pub handling: StringHandling,
}

/// Result of looking a sort name up in one schema
#[derive(Debug, Clone, PartialEq)]
pub enum SortLookup<'a> {
    /// Name resolves to an encodable sort field
    Bound(SortBinding),
    /// A field by that name exists but is index-only
    NotSortable(&'a FieldConfig),
    /// Nothing by that name in this index
    Absent,
}

/// Field mappings of one index at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Index the schema belongs to
    pub index_name: String,
    /// Monotonic schema version, bumped on every reindex
    #[serde(default)]
    pub version: u64,
    /// Number of shards the index is split into
    pub number_of_shards: u32,
    /// Field mappings keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldConfig>,
}

impl FieldSchema {
    /// Create an empty schema at version 0
    pub fn new(index_name: impl Into<String>, number_of_shards: u32) -> Self {
        FieldSchema {
            index_name: index_name.into(),
            version: 0,
            number_of_shards,
            fields: BTreeMap::new(),
        }
    }

    /// Builder: add a field mapping
    pub fn with_field(mut self, config: FieldConfig) -> Self {
        self.fields.insert(config.field_name.clone(), config);
        self
    }

    /// Builder: set the version
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Look up a sort name
    ///
    /// Order: primary sort names, then alias names, then plain field
    /// names. A sortable field requested by its field name while it is
    /// sorted under another name still binds to its primary sort form.
    pub fn lookup_sort(&self, name: &str) -> SortLookup<'_> {
        for config in self.fields.values() {
            if config.sortable && config.sort_name() == name {
                return SortLookup::Bound(config.primary_binding());
            }
        }
        for config in self.fields.values() {
            if let Some(alias) = &config.normalized_alias {
                if alias.name == name {
                    return SortLookup::Bound(config.alias_binding(alias));
                }
            }
        }
        match self.fields.get(name) {
            Some(config) if config.sortable => SortLookup::Bound(config.primary_binding()),
            Some(config) => SortLookup::NotSortable(config),
            None => SortLookup::Absent,
        }
    }

    /// Binding for an explicitly requested alias of `field`
    pub fn lookup_alias(&self, field: &str, alias: &str) -> Option<SortBinding> {
        self.fields.values().find_map(|config| match &config.normalized_alias {
            Some(a) if a.name == alias && (config.field_name == field || config.sort_name() == field) => {
                Some(config.alias_binding(a))
            }
            _ => None,
        })
    }

    /// Every encodable sort field this schema generates material for
    pub fn sort_bindings(&self) -> Vec<SortBinding> {
        let mut bindings = Vec::new();
        for config in self.fields.values() {
            if config.sortable {
                bindings.push(config.primary_binding());
            }
            if let Some(alias) = &config.normalized_alias {
                bindings.push(config.alias_binding(alias));
            }
        }
        bindings
    }

    /// Check the schema is self-consistent
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.index_name.is_empty() {
            return Err(Error::invalid_schema("index name must not be empty"));
        }
        if self.number_of_shards == 0 {
            return Err(Error::invalid_schema(format!(
                "index '{}' must have at least one shard",
                self.index_name
            )));
        }

        let mut sort_names: HashMap<&str, &str> = HashMap::new();
        for (key, config) in &self.fields {
            if key != &config.field_name {
                return Err(Error::invalid_schema(format!(
                    "field mapping key '{}' does not match field name '{}'",
                    key, config.field_name
                )));
            }
            if config.stored_type == FieldType::Score {
                return Err(Error::invalid_schema(format!(
                    "field '{}' cannot be stored as SCORE",
                    key
                )));
            }
            if config.field_name == SCORE_FIELD {
                return Err(Error::invalid_schema(format!(
                    "'{}' is reserved for the relevance score",
                    SCORE_FIELD
                )));
            }

            let mut names = Vec::new();
            if config.sortable {
                names.push(config.sort_name());
            } else if config.sort_field_name.is_some() {
                return Err(Error::invalid_schema(format!(
                    "field '{}' has a sort name but is not sortable",
                    key
                )));
            }
            if let Some(alias) = &config.normalized_alias {
                if config.stored_type != FieldType::String {
                    return Err(Error::invalid_schema(format!(
                        "normalized alias '{}' requires a STRING field, '{}' is {}",
                        alias.name, key, config.stored_type
                    )));
                }
                names.push(alias.name.as_str());
            }

            for name in names {
                if name.is_empty() || name == SCORE_FIELD {
                    return Err(Error::invalid_schema(format!(
                        "field '{}' uses invalid sort name '{}'",
                        key, name
                    )));
                }
                if let Some(owner) = sort_names.insert(name, key) {
                    return Err(Error::invalid_schema(format!(
                        "sort name '{}' is used by both '{}' and '{}'",
                        name, owner, key
                    )));
                }
                if let Some(other) = self.fields.get(name) {
                    if other.field_name != config.field_name {
                        return Err(Error::invalid_schema(format!(
                            "sort name '{}' of field '{}' shadows another field",
                            name, key
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Differences between two versions of one index's schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Sort names only the new schema generates
    pub added_sort_fields: BTreeSet<String>,
    /// Sort names only the old schema generates
    pub removed_sort_fields: BTreeSet<String>,
    /// Sort names present in both whose source field, type or handling changed
    pub changed_sort_fields: BTreeSet<String>,
}

impl SchemaDiff {
    /// Compute the sort-relevant differences from `old` to `new`
    pub fn between(old: &FieldSchema, new: &FieldSchema) -> Self {
        let old_bindings: BTreeMap<String, SortBinding> = old
            .sort_bindings()
            .into_iter()
            .map(|b| (b.sort_field_name.clone(), b))
            .collect();
        let new_bindings: BTreeMap<String, SortBinding> = new
            .sort_bindings()
            .into_iter()
            .map(|b| (b.sort_field_name.clone(), b))
            .collect();

        let mut diff = SchemaDiff::default();
        for (name, binding) in &new_bindings {
            match old_bindings.get(name) {
                None => {
                    diff.added_sort_fields.insert(name.clone());
                }
                Some(previous) if previous != binding => {
                    diff.changed_sort_fields.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        for name in old_bindings.keys() {
            if !new_bindings.contains_key(name) {
                diff.removed_sort_fields.insert(name.clone());
            }
        }
        diff
    }

    /// Whether no sort material changes
    pub fn is_empty(&self) -> bool {
        self.added_sort_fields.is_empty()
            && self.removed_sort_fields.is_empty()
            && self.changed_sort_fields.is_empty()
    }
}
