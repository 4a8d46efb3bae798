//! Concrete records resolved from engine hits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use polydex_core::Result;
use serde::{Deserialize, Serialize};

/// A live record of a concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Concrete type name.
    pub type_name: String,
    /// Local row id within the base type's storage.
    pub id: u32,
    /// Field values as stored.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    /// Record without field values.
    pub fn new(type_name: impl Into<String>, id: u32) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Add a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// A field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Resolves `(type, local id)` pairs to live records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The record, or `None` when it no longer exists.
    async fn resolve(&self, type_name: &str, local_id: u32) -> Result<Option<Record>>;
}
