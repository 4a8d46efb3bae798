//! Engine query protocol.
//!
//! The engine is a separate process that only knows physical index names,
//! 64-bit document ids and numeric attributes. [`SearchEngine`] is the seam
//! the coordinator, the refiner and the maintenance surface talk through;
//! transports implement it, and [`MemoryEngine`](crate::memory::MemoryEngine)
//! provides an in-process stand-in.

use std::collections::BTreeMap;

use async_trait::async_trait;
use polydex_core::{GlobalDocumentId, Result};
use serde::{Deserialize, Serialize};

/// A numeric attribute filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFilter {
    /// Attribute name.
    pub attribute: String,
    /// Accepted (or rejected) values.
    pub values: Vec<u64>,
    /// Reject matching rows instead of requiring them.
    #[serde(default)]
    pub exclude: bool,
}

impl EngineFilter {
    /// Require one of `values`.
    pub fn require(attribute: impl Into<String>, values: Vec<u64>) -> Self {
        Self {
            attribute: attribute.into(),
            values,
            exclude: false,
        }
    }

    /// Reject every value in `values`.
    pub fn exclude(attribute: impl Into<String>, values: Vec<u64>) -> Self {
        Self {
            attribute: attribute.into(),
            values,
            exclude: true,
        }
    }

    /// Whether a row with the given attribute value passes.
    pub fn accepts(&self, value: u64) -> bool {
        self.values.contains(&value) != self.exclude
    }
}

/// Engine-side ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSort {
    /// Relevance.
    #[default]
    Relevance,
    /// Numeric attributes, each `(name, descending)`.
    Attributes(Vec<(String, bool)>),
    /// An engine sort clause such as `Rank DESC, _id ASC`.
    Expression(String),
}

/// One engine request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineQuery {
    /// Free-text query.
    pub text: String,
    /// Physical indexes, searched together.
    pub indexes: Vec<String>,
    /// Attribute filters, combined with AND.
    pub filters: Vec<EngineFilter>,
    /// Output columns and computed `expr AS alias` columns.
    pub select: Vec<String>,
    /// Ordering.
    pub sort: EngineSort,
    /// First match returned.
    pub offset: usize,
    /// Maximum matches returned.
    pub limit: usize,
}

/// One matched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMatch {
    /// Global document id.
    pub id: GlobalDocumentId,
    /// Attribute values, computed columns included.
    pub attributes: BTreeMap<String, u64>,
}

impl EngineMatch {
    /// An attribute value.
    pub fn attribute(&self, name: &str) -> Option<u64> {
        self.attributes.get(name).copied()
    }
}

/// Engine reply.
///
/// Warnings and errors are part of a normal reply; only transport failures
/// are returned as `Err` from [`SearchEngine::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResponse {
    /// Matches in the requested window.
    pub matches: Vec<EngineMatch>,
    /// Matches available to page through.
    pub total: usize,
    /// Matches found before the window was applied.
    pub total_found: usize,
    /// Benign condition reported by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Serious condition reported by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A search engine reachable through the query protocol.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Run one query.
    async fn query(&self, query: &EngineQuery) -> Result<EngineResponse>;

    /// Overwrite a numeric attribute of documents in one index. Returns the
    /// number of documents updated.
    async fn update_attributes(
        &self,
        index: &str,
        attribute: &str,
        values: &[(GlobalDocumentId, u64)],
    ) -> Result<usize>;

    /// Engine name, used in logs.
    fn name(&self) -> &str;
}
