//! Query-time options shared with variant handlers.
//!
//! Variant handlers adjust a search in two places: which physical index each
//! type is read from ([`IndexSelection`]) and which filters and computed
//! columns accompany the engine call ([`QueryOptions`]).

use std::collections::BTreeMap;

use polydex_core::{Stage, partition_id};
use serde::{Deserialize, Serialize};

use crate::index::physical_name;

/// A filter value. Text values are hashed like partition ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A numeric attribute value.
    Int(u64),
    /// A type name or other string, compared through its CRC32.
    Text(String),
}

impl FilterValue {
    /// Numeric form sent to the engine.
    pub fn to_engine(&self) -> u64 {
        match self {
            FilterValue::Int(value) => *value,
            FilterValue::Text(text) => u64::from(partition_id(text)),
        }
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Int(u64::from(value))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Int(u64::from(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

/// Partition requested by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionChoice {
    /// Rows of every partition.
    All,
    /// Rows visible from one partition.
    Only(u32),
}

/// Filters, projections and views of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Attribute must take one of the values.
    #[serde(default)]
    pub require: BTreeMap<String, Vec<FilterValue>>,
    /// Attribute must take none of the values.
    #[serde(default)]
    pub exclude: BTreeMap<String, Vec<FilterValue>>,
    /// Extra select expressions (`expr AS alias`).
    #[serde(default)]
    pub select: Vec<String>,
    /// Staging view; the ambient view when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Partition; the ambient partition when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionChoice>,
}

impl QueryOptions {
    /// Add a required value.
    pub fn require(mut self, attribute: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.add_require(attribute, value);
        self
    }

    /// Add an excluded value.
    pub fn exclude(mut self, attribute: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.add_exclude(attribute, value);
        self
    }

    /// Add a required value in place.
    pub fn add_require(&mut self, attribute: impl Into<String>, value: impl Into<FilterValue>) {
        push_unique(self.require.entry(attribute.into()).or_default(), value.into());
    }

    /// Add an excluded value in place.
    pub fn add_exclude(&mut self, attribute: impl Into<String>, value: impl Into<FilterValue>) {
        push_unique(self.exclude.entry(attribute.into()).or_default(), value.into());
    }

    /// Add a select expression unless already present.
    pub fn add_select(&mut self, expression: impl Into<String>) {
        let expression = expression.into();
        if !self.select.contains(&expression) {
            self.select.push(expression);
        }
    }
}

fn push_unique(values: &mut Vec<FilterValue>, value: FilterValue) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// One physical index chosen for a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedIndex {
    /// Requested concrete type.
    pub type_name: String,
    /// Chosen base type of the index.
    pub base_index: String,
    /// Read the published-snapshot copy.
    pub staged: bool,
    /// Read the delta twin.
    pub delta: bool,
}

impl SelectedIndex {
    /// Primary index of a type.
    pub fn primary(type_name: impl Into<String>, base_index: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            base_index: base_index.into(),
            staged: false,
            delta: false,
        }
    }

    /// Physical index name.
    pub fn name(&self) -> String {
        physical_name(&self.base_index, self.staged, self.delta)
    }
}

/// Per-type physical index selection of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSelection {
    entries: Vec<SelectedIndex>,
}

impl IndexSelection {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn push(&mut self, entry: SelectedIndex) {
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[SelectedIndex] {
        &self.entries
    }

    /// Mutable entries.
    pub fn entries_mut(&mut self) -> &mut [SelectedIndex] {
        &mut self.entries
    }

    /// Selected types, deduplicated, in insertion order.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.type_name.as_str()) {
                names.push(&entry.type_name);
            }
        }
        names
    }

    /// Physical index names, deduplicated, in insertion order.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in &self.entries {
            let name = entry.name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
