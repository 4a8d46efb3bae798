//! Field introspection.
//!
//! `FieldIntrospector::fields` walks a type's ancestry from the top-level
//! type down, merging each level's search settings with those of the levels
//! below it. Lists are unioned, never replaced, so a subtype can only add to
//! what its ancestors index.

use std::collections::BTreeMap;
use std::sync::Arc;

use polydex_core::{FieldKind, FieldPolicy, TypeRegistry};
use serde::{Deserialize, Serialize};

/// Implicit field holding the concrete type name on top-level types.
pub const CLASS_NAME_FIELD: &str = "class_name";

/// Implicit flag set once a row has been folded into the primary index.
pub const PRIMARY_INDEXED_FIELD: &str = "primary_indexed";

/// One indexed field of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field (and column) name.
    pub name: String,
    /// Data kind.
    pub kind: FieldKind,
    /// Usable as a filter attribute.
    pub filterable: bool,
    /// Usable as a sort key.
    pub sortable: bool,
    /// Stored as a string.
    pub string_like: bool,
    /// Type whose table holds the column.
    pub owning_type: String,
    /// Value expression of a computed field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl FieldDescriptor {
    /// Descriptor of a stored field.
    pub fn stored(
        name: impl Into<String>,
        kind: FieldKind,
        owning_type: impl Into<String>,
        filterable: bool,
        sortable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            filterable,
            sortable,
            string_like: kind.is_string_like(),
            owning_type: owning_type.into(),
            expression: None,
        }
    }

    /// Descriptor of a computed field. Computed values are always numeric
    /// attributes, filterable and sortable.
    pub fn computed(
        name: impl Into<String>,
        expression: impl Into<String>,
        owning_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Custom,
            filterable: true,
            sortable: true,
            string_like: false,
            owning_type: owning_type.into(),
            expression: Some(expression.into()),
        }
    }

    /// Whether this field needs a packed companion column for sorting.
    pub fn needs_packed_key(&self) -> bool {
        self.string_like && self.sortable
    }
}

/// Merged field lists in effect at one level of the ancestry walk.
#[derive(Debug, Clone, Default)]
struct FieldLists {
    search: Vec<String>,
    filter: Vec<String>,
    sort: Vec<String>,
    extra: BTreeMap<String, String>,
}

impl FieldLists {
    fn contains(list: &[String], name: &str) -> bool {
        list.iter().any(|n| n == name)
    }
}

/// Upsert keeping the original position of a replaced entry.
pub(crate) fn upsert_field(fields: &mut Vec<FieldDescriptor>, field: FieldDescriptor) {
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

/// Derives ordered field descriptor lists from the type registry.
#[derive(Debug, Clone)]
pub struct FieldIntrospector {
    registry: Arc<TypeRegistry>,
    policy: FieldPolicy,
}

impl FieldIntrospector {
    /// Create an introspector with the given selection policy.
    pub fn new(registry: Arc<TypeRegistry>, policy: FieldPolicy) -> Self {
        Self { registry, policy }
    }

    /// The registry this introspector reads.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Active selection policy.
    pub fn policy(&self) -> FieldPolicy {
        self.policy
    }

    /// Ordered field descriptors of a type. Unknown types have no fields.
    pub fn fields(&self, type_name: &str) -> Vec<FieldDescriptor> {
        self.collect(type_name, &FieldLists::default())
    }

    fn collect(&self, type_name: &str, child: &FieldLists) -> Vec<FieldDescriptor> {
        let Some(def) = self.registry.get(type_name) else {
            return Vec::new();
        };

        let mut lists = FieldLists::default();
        if let Some(own) = &def.search {
            lists.search = own.search_fields.clone();
            lists.filter = own.filter_fields.clone();
            lists.sort = own.sort_fields.clone();
            lists.extra = own.extra_fields.clone();
        }
        lists.search.extend(child.search.iter().cloned());
        lists.filter.extend(child.filter.iter().cloned());
        lists.sort.extend(child.sort.iter().cloned());
        lists.extra.extend(child.extra.clone());

        let mut fields = match def.parent.as_deref() {
            Some(parent) => self.collect(parent, &lists),
            None => Vec::new(),
        };

        let mut stored: Vec<(&str, FieldKind)> = Vec::new();
        if def.parent.is_none() {
            stored.push((CLASS_NAME_FIELD, FieldKind::EnumeratedText));
        }
        stored.extend(def.fields.iter().map(|(name, kind)| (name.as_str(), *kind)));
        if def.searchable {
            stored.push((PRIMARY_INDEXED_FIELD, FieldKind::Boolean));
        }

        for (name, kind) in stored {
            let sortable = FieldLists::contains(&lists.sort, name);
            let descriptor = match self.policy {
                FieldPolicy::OptIn if name != PRIMARY_INDEXED_FIELD => {
                    let filterable = sortable || FieldLists::contains(&lists.filter, name);
                    let selected = filterable || FieldLists::contains(&lists.search, name);
                    if !selected {
                        continue;
                    }
                    FieldDescriptor::stored(name, kind, &def.name, filterable, sortable)
                }
                _ => FieldDescriptor::stored(name, kind, &def.name, true, sortable),
            };
            upsert_field(&mut fields, descriptor);
        }

        for (name, expression) in &lists.extra {
            upsert_field(
                &mut fields,
                FieldDescriptor::computed(name, expression, &def.name),
            );
        }

        fields
    }
}

// ============================================================================
// Tests
// ============================================================================
