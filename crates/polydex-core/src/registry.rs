//! Immutable record type registry.
//!
//! The registry is the single source of truth about the record type
//! hierarchy: which type extends which, what each type stores, and the
//! per-type search settings. It is built once at startup (usually from a
//! TOML document) and then only read.
//!
//! ```toml
//! [[types]]
//! name = "Article"
//! searchable = true
//! staged = true
//! fields = { Title = "varchar", Rating = "int" }
//!
//! [types.search]
//! sort_fields = ["Title"]
//!
//! [[types]]
//! name = "NewsArticle"
//! parent = "Article"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Storage kind of a field as declared in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text (`varchar`, `text`, `html_text`, `html_varchar`).
    #[serde(alias = "varchar", alias = "html_text", alias = "html_varchar")]
    Text,
    /// One of a fixed set of strings.
    #[serde(alias = "enum")]
    EnumeratedText,
    /// True/false.
    Boolean,
    /// Unsigned integer, including foreign keys.
    #[serde(alias = "int", alias = "foreign_key")]
    Integer,
    /// Date or date-time, indexed as a UNIX timestamp.
    #[serde(alias = "date", alias = "datetime")]
    Timestamp,
    /// String indexed through its CRC32 hash.
    #[serde(alias = "crc_ordinal")]
    Ordinal,
    /// Computed value, produced by an expression.
    Custom,
}

impl FieldKind {
    /// Whether values of this kind are strings in storage.
    pub fn is_string_like(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::EnumeratedText)
    }
}

/// How rows reach the engine for an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// The engine reads rows with a relational query.
    #[default]
    Sql,
    /// The engine runs an external command producing a document feed.
    Feed,
}

/// Partition membership rule of a base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScope {
    /// Rows are not partitioned.
    #[default]
    None,
    /// A row is visible only in its own partition.
    Exact,
    /// A row is visible in its own partition; partition 0 is visible everywhere.
    Shared,
}

/// A many-many relation exposed as a multi-value attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManyManyRelation {
    /// Related type.
    pub target: String,
    /// Join table holding the pairs.
    pub join_table: String,
    /// Join table column referencing this type.
    pub parent_field: String,
    /// Join table column referencing the target type.
    pub component_field: String,
}

/// Per-type search settings. Lists are unioned with those of subtypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Fields indexed as full text (opt-in policy).
    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Fields usable as filters.
    #[serde(default)]
    pub filter_fields: Vec<String>,

    /// Fields usable for sorting.
    #[serde(default)]
    pub sort_fields: Vec<String>,

    /// Computed fields: name to value expression.
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,

    /// Indexing mode; inherited from the nearest configured ancestor when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<IndexMode>,

    /// Fields whose content comes from an external provider (feed mode only).
    #[serde(default)]
    pub external_content: BTreeMap<String, String>,

    /// Many-many relations exposed as filterable attributes; `*` means all.
    #[serde(default)]
    pub filterable_many_many: Vec<String>,

    /// Extra multi-value attributes: name to row query.
    #[serde(default)]
    pub extra_many_many: BTreeMap<String, String>,
}

/// One record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Unique type name.
    pub name: String,

    /// Parent type, `None` for a top-level (base) type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Whether this type carries the searchable extension.
    #[serde(default)]
    pub searchable: bool,

    /// Whether the type has storage rows of its own.
    #[serde(default = "default_true")]
    pub storage: bool,

    /// Storage table, defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Whether the type has a draft/published duality.
    #[serde(default)]
    pub staged: bool,

    /// Partition rule (only meaningful on base types).
    #[serde(default)]
    pub partitioned: PartitionScope,

    /// Stored fields declared by this type itself.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,

    /// Many-many relations declared by this type.
    #[serde(default)]
    pub many_many: BTreeMap<String, ManyManyRelation>,

    /// Search settings, if this type configures any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSettings>,
}

fn default_true() -> bool {
    true
}

impl TypeDefinition {
    /// Create a bare type definition with storage and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            searchable: false,
            storage: true,
            table: None,
            staged: false,
            partitioned: PartitionScope::None,
            fields: BTreeMap::new(),
            many_many: BTreeMap::new(),
            search: None,
        }
    }

    /// Set the parent type.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Mark the type searchable.
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Mark the type as staged (draft/published).
    pub fn staged(mut self) -> Self {
        self.staged = true;
        self
    }

    /// Set the partition rule.
    pub fn with_partition(mut self, scope: PartitionScope) -> Self {
        self.partitioned = scope;
        self
    }

    /// Mark the type as having no storage rows.
    pub fn without_storage(mut self) -> Self {
        self.storage = false;
        self
    }

    /// Declare a stored field.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Declare a many-many relation.
    pub fn with_many_many(mut self, name: impl Into<String>, relation: ManyManyRelation) -> Self {
        self.many_many.insert(name.into(), relation);
        self
    }

    /// Attach search settings.
    pub fn with_search(mut self, search: SearchSettings) -> Self {
        self.search = Some(search);
        self
    }

    /// Storage table name.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    types: Vec<TypeDefinition>,
}

/// The loaded, validated type hierarchy.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDefinition>,
    by_name: HashMap<String, usize>,
}

impl TypeRegistry {
    /// Build a registry from definitions, validating the hierarchy.
    pub fn new(types: Vec<TypeDefinition>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(types.len());
        for (idx, def) in types.iter().enumerate() {
            if by_name.insert(def.name.clone(), idx).is_some() {
                return Err(Error::config(format!("duplicate type '{}'", def.name)));
            }
        }
        let registry = Self { types, by_name };
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a registry from TOML (`[[types]]` tables).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(content)?;
        Self::new(file.types)
    }

    /// Load a registry from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let registry = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded {} record types from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Reject unknown parents and cycles.
    pub fn validate(&self) -> Result<()> {
        for def in &self.types {
            if let Some(parent) = &def.parent
                && !self.by_name.contains_key(parent)
            {
                return Err(Error::config(format!(
                    "type '{}' has unknown parent '{parent}'",
                    def.name
                )));
            }

            let mut seen = HashSet::new();
            let mut current = Some(def);
            while let Some(node) = current {
                if !seen.insert(node.name.as_str()) {
                    return Err(Error::config(format!(
                        "inheritance cycle through type '{}'",
                        def.name
                    )));
                }
                current = self.parent_of(&node.name);
            }
        }
        Ok(())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.iter()
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.by_name.get(name).map(|&idx| &self.types[idx])
    }

    /// Look up a type by name, failing when it is unknown.
    pub fn require(&self, name: &str) -> Result<&TypeDefinition> {
        self.get(name).ok_or_else(|| Error::not_found(name, "record type"))
    }

    /// Declaration position of a type, used for deterministic ordering.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Parent definition of a type.
    pub fn parent_of(&self, name: &str) -> Option<&TypeDefinition> {
        self.get(name)
            .and_then(|def| def.parent.as_deref())
            .and_then(|parent| self.get(parent))
    }

    /// Ancestry of a type, root first, ending with the type itself.
    ///
    /// Unknown types yield an empty chain.
    pub fn ancestry(&self, name: &str) -> Vec<&TypeDefinition> {
        let mut chain = Vec::new();
        let mut current = self.get(name);
        while let Some(def) = current {
            chain.push(def);
            current = def.parent.as_deref().and_then(|p| self.get(p));
        }
        chain.reverse();
        chain
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut current = self.parent_of(descendant);
        while let Some(def) = current {
            if def.name == ancestor {
                return true;
            }
            current = self.parent_of(&def.name);
        }
        false
    }

    /// Strict descendants of a type, in declaration order.
    pub fn descendants(&self, name: &str) -> Vec<&TypeDefinition> {
        self.types
            .iter()
            .filter(|def| self.is_ancestor(name, &def.name))
            .collect()
    }

    /// Topmost ancestor of a type; owns the storage identity and partition id.
    pub fn base_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.ancestry(name).into_iter().next()
    }

    /// Most ancestral type in the chain carrying the searchable extension.
    pub fn declared_base(&self, name: &str) -> Option<&TypeDefinition> {
        self.ancestry(name).into_iter().find(|def| def.searchable)
    }

    /// Whether a type is searchable, itself or through an ancestor.
    pub fn is_searchable(&self, name: &str) -> bool {
        self.declared_base(name).is_some()
    }

    /// All searchable types, in declaration order.
    pub fn searchable_types(&self) -> Vec<&TypeDefinition> {
        self.types
            .iter()
            .filter(|def| self.is_searchable(&def.name))
            .collect()
    }

    /// Search settings of a type or, failing that, its nearest configured ancestor.
    pub fn effective_settings(&self, name: &str) -> Option<&SearchSettings> {
        self.ancestry(name)
            .into_iter()
            .rev()
            .find_map(|def| def.search.as_ref())
    }

    /// Indexing mode of a type, inherited; defaults to [`IndexMode::Sql`].
    pub fn index_mode(&self, name: &str) -> IndexMode {
        self.ancestry(name)
            .into_iter()
            .rev()
            .find_map(|def| def.search.as_ref().and_then(|s| s.mode))
            .unwrap_or_default()
    }

    /// Whether the type or any ancestor is staged.
    pub fn is_staged(&self, name: &str) -> bool {
        self.ancestry(name).iter().any(|def| def.staged)
    }

    /// Partition rule of the type's base type.
    pub fn partition_scope(&self, name: &str) -> PartitionScope {
        self.base_type(name)
            .map(|def| def.partitioned)
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
