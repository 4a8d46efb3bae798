//! External document feeds.
//!
//! Indexes in [`IndexMode::Feed`] are not read by the engine directly. The
//! engine runs a command that prints a self-describing XML feed instead: a
//! schema followed by one document per row, text fields wrapped in CDATA,
//! externally computed fields appended and multi-value attributes written as
//! comma-delimited lists.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use polydex_core::{Error, IndexMode, Result, TypeRegistry};
use regex::Regex;

use crate::index::IndexDescriptor;
use crate::source::{AttrType, ID_COLUMN, LOCAL_ID_ATTR};

/// One fetched row, column alias to value.
pub type Row = BTreeMap<String, String>;

/// Executes a source's statements against the record store.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Run a statement for its side effects.
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Run a query and return its rows.
    async fn fetch(&self, query: &str) -> Result<Vec<Row>>;
}

/// Produces externally computed field content, such as text extracted from
/// an uploaded file.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Content produced by `provider` for the row with the given local id.
    async fn content(&self, provider: &str, local_id: &str) -> Result<Option<String>>;
}

/// Builds XML feeds for feed-mode indexes.
#[derive(Debug, Clone)]
pub struct FeedBuilder {
    max_value_bytes: usize,
    control_chars: Regex,
    tags: Regex,
}

impl FeedBuilder {
    /// Builder truncating values to `max_value_bytes`.
    pub fn new(max_value_bytes: usize) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::config(format!("invalid feed pattern: {e}")))
        };
        Ok(Self {
            max_value_bytes,
            control_chars: compile(r"[\x01-\x08\x0B\x0C\x0E-\x1F]")?,
            tags: compile(r"<[^>]*>")?,
        })
    }

    /// Make a value safe to embed in the feed: control characters, CDATA
    /// terminators and markup are removed and the result is truncated on a
    /// character boundary.
    pub fn sanitize(&self, value: &str) -> String {
        let cleaned = self.control_chars.replace_all(value, "");
        let mut cleaned = self.tags.replace_all(&cleaned, "").into_owned();
        // Removing one terminator can join its neighbours into another.
        while cleaned.contains("]]>") {
            cleaned = cleaned.replace("]]>", "");
        }
        if cleaned.len() > self.max_value_bytes {
            let mut end = self.max_value_bytes;
            while !cleaned.is_char_boundary(end) {
                end -= 1;
            }
            cleaned.truncate(end);
        }
        cleaned
    }

    /// Produce the feed of one index.
    pub async fn build(
        &self,
        registry: &TypeRegistry,
        index: &IndexDescriptor,
        rows: &dyn RowSource,
        content: Option<&dyn ContentProvider>,
    ) -> Result<String> {
        if index.mode != IndexMode::Feed {
            return Err(Error::operation(format!(
                "index {} is not fed externally",
                index.name()
            )));
        }
        let source = &index.source;
        let external: BTreeMap<String, String> = registry
            .effective_settings(&index.base_type)
            .map(|s| s.external_content.clone())
            .unwrap_or_default();

        let attribute_types: BTreeMap<&str, AttrType> = source
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.attr_type))
            .collect();
        let text_fields: Vec<&str> = source
            .columns
            .iter()
            .map(|c| c.alias.as_str())
            .filter(|alias| *alias != ID_COLUMN && !attribute_types.contains_key(alias))
            .collect();

        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<sphinx:docset>\n");
        out.push_str("  <sphinx:schema>\n");
        for field in text_fields.iter().copied().chain(external.keys().map(String::as_str)) {
            let _ = writeln!(out, "    <sphinx:field name=\"{}\"/>", field.to_lowercase());
        }
        for attribute in &source.attributes {
            let tag = match attribute.attr_type {
                AttrType::Uint => "int",
                other => other.as_str(),
            };
            let _ = writeln!(
                out,
                "    <sphinx:attr name=\"{}\" type=\"{tag}\"/>",
                attribute.name.to_lowercase()
            );
        }
        for multi in &source.multi_values {
            let _ = writeln!(
                out,
                "    <sphinx:attr name=\"{}\" type=\"multi\"/>",
                multi.name.to_lowercase()
            );
        }
        out.push_str("  </sphinx:schema>\n");

        for pre in &source.pre_queries {
            rows.execute(&pre.to_sql()).await?;
        }

        let mut multi_data: Vec<(&str, BTreeMap<String, Vec<String>>)> = Vec::new();
        for multi in &source.multi_values {
            let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for row in rows.fetch(&multi.query).await? {
                if let (Some(id), Some(value)) = (row.get(ID_COLUMN), row.get(&multi.name)) {
                    values.entry(id.clone()).or_default().push(value.clone());
                }
            }
            multi_data.push((multi.name.as_str(), values));
        }

        let documents = rows.fetch(&source.query()).await?;
        log::debug!("Feeding {} row(s) into {}", documents.len(), index.name());

        for row in &documents {
            let id = row.get(ID_COLUMN).map(String::as_str).unwrap_or_default();
            let _ = writeln!(out, "  <sphinx:document id=\"{id}\">");

            for column in source.columns.iter().filter(|c| c.alias != ID_COLUMN) {
                let value = self.sanitize(row.get(&column.alias).map(String::as_str).unwrap_or_default());
                let tag = column.alias.to_lowercase();
                if attribute_types.contains_key(column.alias.as_str()) || value.is_empty() {
                    let _ = writeln!(out, "    <{tag}>{value}</{tag}>");
                } else {
                    let _ = writeln!(out, "    <{tag}><![CDATA[{value}]]></{tag}>");
                }
            }

            if let Some(provider) = content {
                let local_id = row.get(LOCAL_ID_ATTR).map(String::as_str).unwrap_or_default();
                for (field, name) in &external {
                    let text = provider.content(name, local_id).await?.unwrap_or_default();
                    let value = self.sanitize(&text);
                    let tag = field.to_lowercase();
                    if value.is_empty() {
                        let _ = writeln!(out, "    <{tag}></{tag}>");
                    } else {
                        let _ = writeln!(out, "    <{tag}><![CDATA[{value}]]></{tag}>");
                    }
                }
            }

            for (name, values) in &multi_data {
                let list = values.get(id).map(|v| v.join(",")).unwrap_or_default();
                let tag = name.to_lowercase();
                let _ = writeln!(out, "    <{tag}>{list}</{tag}>");
            }

            out.push_str("  </sphinx:document>\n");
        }

        out.push_str("</sphinx:docset>\n");
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
