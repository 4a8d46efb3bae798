//! Engine configuration artifact.
//!
//! Renders planned physical indexes into the engine's block-structured
//! configuration text and reads it back. Each physical index becomes a
//! source block inheriting `BaseSrc` and an index block inheriting `BaseIdx`:
//!
//! ```text
//! source ArticleSrc : BaseSrc
//! {
//!     sql_query_pre = UPDATE `Article` SET ...
//!     sql_query = SELECT ...
//!     sql_attr_uint = _id
//! }
//!
//! index Article : BaseIdx
//! {
//!     source = ArticleSrc
//!     path = var/polydex/idx/Article
//! }
//! ```
//!
//! [`IndexSummary`] is the part of a descriptor the artifact carries; it can
//! be built from either side, which is how round trips are checked.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use polydex_core::{Error, IndexMode, PolydexConfig, Result};
use serde::{Deserialize, Serialize};

use crate::index::IndexDescriptor;
use crate::source::AttrType;

/// Name of the source block every index source inherits from.
pub const BASE_SOURCE: &str = "BaseSrc";
/// Name of the index block every index inherits from.
pub const BASE_INDEX: &str = "BaseIdx";

const CHARSET_PRE_QUERY: &str = "SET NAMES utf8";

/// One parsed configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBlock {
    /// Block kind: `source`, `index`, `indexer` or `searchd`.
    pub kind: String,
    /// Block name, absent for `indexer` and `searchd`.
    pub name: Option<String>,
    /// Inherited block.
    pub parent: Option<String>,
    /// Entries in file order. Keys may repeat.
    pub entries: Vec<(String, String)>,
}

impl ArtifactBlock {
    fn new(kind: &str, name: Option<&str>, parent: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.map(str::to_string),
            parent: parent.map(str::to_string),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push((key.to_string(), value.into()));
    }

    /// First value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a key, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn render(&self, out: &mut String) {
        out.push_str(&self.kind);
        if let Some(name) = &self.name {
            let _ = write!(out, " {name}");
        }
        if let Some(parent) = &self.parent {
            let _ = write!(out, " : {parent}");
        }
        out.push_str("\n{\n");
        for (key, value) in &self.entries {
            let _ = writeln!(out, "\t{key} = {}", single_line(value));
        }
        out.push_str("}\n\n");
    }
}

/// What the artifact records about one physical index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Physical index name.
    pub name: String,
    /// Source block name.
    pub source: String,
    /// How rows reach the engine.
    pub mode: IndexMode,
    /// On-disk index path.
    pub path: String,
    /// Statements run before the read, excluding the charset statement.
    pub pre_queries: Vec<String>,
    /// Row query of relational sources.
    pub query: Option<String>,
    /// Feed command of feed sources.
    pub command: Option<String>,
    /// Typed attributes of relational sources. Feed sources declare theirs
    /// in the feed itself.
    pub attributes: Vec<(String, AttrType)>,
    /// Multi-value attributes and their queries.
    pub multi_values: Vec<(String, String)>,
}

impl IndexSummary {
    /// Summary of a planned descriptor.
    pub fn from_descriptor(config: &PolydexConfig, index: &IndexDescriptor) -> Self {
        let source = &index.source;
        let name = index.name();
        let path = index_path(config, &name);
        match index.mode {
            IndexMode::Sql => Self {
                source: index.source_name(),
                mode: IndexMode::Sql,
                path,
                pre_queries: source
                    .pre_queries
                    .iter()
                    .map(|p| single_line(&p.to_sql()))
                    .collect(),
                query: Some(single_line(&source.query())),
                command: None,
                attributes: source
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), a.attr_type))
                    .collect(),
                multi_values: source
                    .multi_values
                    .iter()
                    .map(|m| (m.name.clone(), single_line(&m.query)))
                    .collect(),
                name,
            },
            IndexMode::Feed => Self {
                command: Some(format!("{} {}", config.feed_command, index.source_name())),
                source: index.source_name(),
                mode: IndexMode::Feed,
                path,
                pre_queries: Vec::new(),
                query: None,
                attributes: Vec::new(),
                multi_values: Vec::new(),
                name,
            },
        }
    }

    /// Summaries of every index block in a parsed artifact.
    pub fn from_blocks(blocks: &[ArtifactBlock]) -> Result<Vec<Self>> {
        let sources: BTreeMap<&str, &ArtifactBlock> = blocks
            .iter()
            .filter(|b| b.kind == "source")
            .filter_map(|b| b.name.as_deref().map(|n| (n, b)))
            .collect();

        let mut out = Vec::new();
        for block in blocks.iter().filter(|b| b.kind == "index") {
            let Some(name) = block.name.as_deref() else {
                continue;
            };
            if name == BASE_INDEX {
                continue;
            }
            let source_name = block
                .get("source")
                .ok_or_else(|| Error::parse(format!("index {name} has no source")))?;
            let path = block
                .get("path")
                .ok_or_else(|| Error::parse(format!("index {name} has no path")))?;
            let source = sources
                .get(source_name)
                .ok_or_else(|| Error::not_found(source_name, "source block"))?;

            let mode = if source.get("type") == Some("xmlpipe2") {
                IndexMode::Feed
            } else {
                IndexMode::Sql
            };

            let mut attributes = Vec::new();
            let mut multi_values = Vec::new();
            for (key, value) in &source.entries {
                if key == "sql_attr_multi" {
                    multi_values.push(parse_multi(value)?);
                } else if let Some(tag) = key.strip_prefix("sql_attr_") {
                    let attr_type = AttrType::parse(tag)
                        .ok_or_else(|| Error::parse(format!("unknown attribute type {tag}")))?;
                    attributes.push((value.clone(), attr_type));
                }
            }

            out.push(Self {
                name: name.to_string(),
                source: source_name.to_string(),
                mode,
                path: path.to_string(),
                pre_queries: source
                    .get_all("sql_query_pre")
                    .filter(|q| *q != CHARSET_PRE_QUERY)
                    .map(str::to_string)
                    .collect(),
                query: source.get("sql_query").map(str::to_string),
                command: source.get("xmlpipe_command").map(str::to_string),
                attributes,
                multi_values,
            });
        }
        Ok(out)
    }
}

/// On-disk path of a physical index.
pub fn index_path(config: &PolydexConfig, index_name: &str) -> String {
    config.index_path.join(index_name).display().to_string()
}

/// Render the full artifact for the given physical indexes.
pub fn render_artifact(config: &PolydexConfig, indexes: &[IndexDescriptor]) -> String {
    let mut out = String::new();

    let mut base_source = ArtifactBlock::new("source", Some(BASE_SOURCE), None);
    base_source.push("type", "mysql");
    base_source.render(&mut out);

    let mut base_index = ArtifactBlock::new("index", Some(BASE_INDEX), None);
    for (key, value) in &config.base_index_options {
        base_index.push(key, value.clone());
    }
    base_index.render(&mut out);

    for index in indexes {
        let summary = IndexSummary::from_descriptor(config, index);
        source_block(&summary).render(&mut out);

        let mut block = ArtifactBlock::new("index", Some(&summary.name), Some(BASE_INDEX));
        block.push("source", summary.source.clone());
        block.push("path", summary.path.clone());
        block.render(&mut out);
    }

    let mut indexer = ArtifactBlock::new("indexer", None, None);
    for (key, value) in &config.indexer_options {
        indexer.push(key, value.clone());
    }
    indexer.render(&mut out);

    let var = config.var_path.display();
    let mut searchd_options = config.searchd_options.clone();
    searchd_options
        .entry("listen".into())
        .or_insert_with(|| config.listen.clone());
    searchd_options
        .entry("pid_file".into())
        .or_insert_with(|| format!("{var}/searchd.pid"));
    searchd_options
        .entry("log".into())
        .or_insert_with(|| format!("{var}/searchd.log"));
    searchd_options
        .entry("query_log".into())
        .or_insert_with(|| format!("{var}/query.log"));
    let mut searchd = ArtifactBlock::new("searchd", None, None);
    for (key, value) in searchd_options {
        searchd.push(&key, value);
    }
    searchd.render(&mut out);

    out
}

fn source_block(summary: &IndexSummary) -> ArtifactBlock {
    let mut block = ArtifactBlock::new("source", Some(&summary.source), Some(BASE_SOURCE));
    match summary.mode {
        IndexMode::Feed => {
            block.push("type", "xmlpipe2");
            if let Some(command) = &summary.command {
                block.push("xmlpipe_command", command.clone());
            }
        }
        IndexMode::Sql => {
            block.push("sql_query_pre", CHARSET_PRE_QUERY);
            for pre in &summary.pre_queries {
                block.push("sql_query_pre", pre.clone());
            }
            if let Some(query) = &summary.query {
                block.push("sql_query", query.clone());
            }
            for (name, attr_type) in &summary.attributes {
                block.push(&format!("sql_attr_{attr_type}"), name.clone());
            }
            for (name, query) in &summary.multi_values {
                block.push("sql_attr_multi", format!("uint {name} from query; {query}"));
            }
        }
    }
    block
}

fn parse_multi(value: &str) -> Result<(String, String)> {
    let invalid = || Error::parse(format!("malformed sql_attr_multi: {value}"));
    let rest = value.strip_prefix("uint ").ok_or_else(invalid)?;
    let (name, query) = rest.split_once(" from query; ").ok_or_else(invalid)?;
    Ok((name.to_string(), query.to_string()))
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse artifact text into blocks.
pub fn parse_artifact(text: &str) -> Result<Vec<ArtifactBlock>> {
    let mut blocks = Vec::new();
    let mut current: Option<ArtifactBlock> = None;
    let mut opened = false;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let at = |message: &str| Error::parse(format!("line {}: {message}", number + 1));

        if current.is_none() {
            let (head, parent) = match line.split_once(':') {
                Some((head, parent)) => (head.trim(), Some(parent.trim())),
                None => (line, None),
            };
            let mut words = head.split_whitespace();
            let kind = words.next().ok_or_else(|| at("expected block header"))?;
            let name = words.next();
            if words.next().is_some() {
                return Err(at("unexpected token in block header"));
            }
            current = Some(ArtifactBlock::new(kind, name, parent));
            opened = false;
            continue;
        }
        if !opened {
            if line != "{" {
                return Err(at("expected '{'"));
            }
            opened = true;
            continue;
        }
        if line == "}" {
            blocks.extend(current.take());
            opened = false;
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| at("expected 'key = value'"))?;
        if let Some(block) = current.as_mut() {
            block.push(key.trim(), value.trim());
        }
    }

    if current.is_some() {
        return Err(Error::parse("unterminated block at end of artifact"));
    }
    Ok(blocks)
}

// ============================================================================
// Tests
// ============================================================================
