//! Search requests and results.

use std::collections::BTreeMap;

use polydex_core::GlobalDocumentId;
use polydex_plan::QueryOptions;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One field of a field sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Field name.
    pub name: String,
    /// Sort descending.
    #[serde(default)]
    pub descending: bool,
}

impl SortField {
    /// Ascending sort on a field.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    /// Descending sort on a field.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
        }
    }
}

/// How results are ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortSpec {
    /// Engine relevance.
    #[default]
    Relevance,
    /// By field values, in order.
    Fields(Vec<SortField>),
    /// By an engine expression.
    Expression(String),
}

/// A logical search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Types to search.
    pub types: Vec<String>,
    /// Free-text query.
    pub query: String,
    /// Filters, projections and variant views.
    #[serde(default)]
    pub options: QueryOptions,
    /// Ordering.
    #[serde(default)]
    pub sort: SortSpec,
    /// Explicit record offset; takes priority over `page`.
    #[serde(default)]
    pub start: Option<usize>,
    /// Zero-based page.
    #[serde(default)]
    pub page: usize,
    /// Page size; the configured default when absent.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Search descendants of `types` too.
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    /// Try spelling corrections when few records match.
    #[serde(default)]
    pub suggestions: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    /// Search `types` for `query` with default options.
    pub fn new<I, S>(types: I, query: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            query: query.into(),
            options: QueryOptions::default(),
            sort: SortSpec::Relevance,
            start: None,
            page: 0,
            page_size: None,
            include_descendants: true,
            suggestions: false,
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Sort by fields.
    pub fn sort_by(mut self, fields: Vec<SortField>) -> Self {
        self.sort = SortSpec::Fields(fields);
        self
    }

    /// Sort by an engine expression.
    pub fn sort_by_expression(mut self, expression: impl Into<String>) -> Self {
        self.sort = SortSpec::Expression(expression.into());
        self
    }

    /// Request a page.
    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = Some(page_size);
        self
    }

    /// Start at an explicit record offset.
    pub fn start(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    /// Only search the listed types.
    pub fn exact_types(mut self) -> Self {
        self.include_descendants = false;
        self
    }

    /// Ask for a spelling suggestion when few records match.
    pub fn with_suggestions(mut self) -> Self {
        self.suggestions = true;
        self
    }

    /// Record offset of the requested page.
    pub fn offset(&self, page_size: usize) -> usize {
        self.start.unwrap_or(self.page.saturating_mul(page_size))
    }
}

/// One resolved engine match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Global document id reported by the engine.
    pub id: GlobalDocumentId,
    /// Attribute values reported by the engine.
    pub attributes: BTreeMap<String, u64>,
    /// The live record.
    pub record: Record,
}

/// A better-matching rewrite of the query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Corrected plain text.
    pub text: String,
    /// Corrected text with substituted words in `<strong>` tags.
    pub html: String,
    /// Matches of the corrected query.
    pub total: usize,
}

/// The page of results of one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Resolved matches, in result order.
    pub matches: Vec<Hit>,
    /// Total matches reported by the engine. Not adjusted for dropped hits.
    pub total: usize,
    /// Record offset of the page.
    pub offset: usize,
    /// Page size.
    pub page_size: usize,
    /// Physical indexes queried.
    pub indexes: Vec<String>,
    /// Engine warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Engine error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Spelling suggestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl SearchResult {
    /// A result without matches.
    pub fn empty(offset: usize, page_size: usize) -> Self {
        Self {
            matches: Vec::new(),
            total: 0,
            offset,
            page_size,
            indexes: Vec::new(),
            warning: None,
            error: None,
            suggestion: None,
        }
    }

    /// Resolved records, in result order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.matches.iter().map(|hit| &hit.record)
    }

    /// Number of pages covering `total`.
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    /// Zero-based page containing `offset`.
    pub fn current_page(&self) -> usize {
        self.offset.checked_div(self.page_size).unwrap_or(0)
    }
}
