//! Runtime configuration.
//!
//! `PolydexConfig` collects the operational knobs of the planner and the
//! query coordinator: where index files live, the field selection policy,
//! the index-count escape valves, and whether engine warnings/errors are
//! escalated. It deserializes from TOML with every field optional.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the field introspector treats fields that are not explicitly listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Every stored field is searchable and filterable.
    #[default]
    IncludeAll,
    /// Only listed fields are indexed (sort implies filter implies search).
    OptIn,
}

/// Draft/published view of staged storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The editable draft tables.
    #[default]
    Draft,
    /// The published snapshot tables.
    Published,
}

/// Top-level Polydex configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolydexConfig {
    /// Directory holding the engine's index files.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Directory for engine pid and log files.
    #[serde(default = "default_var_path")]
    pub var_path: PathBuf,

    /// Engine listen address, rendered into the `searchd` block.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Command the engine runs to obtain an external feed for a source.
    #[serde(default = "default_feed_command")]
    pub feed_command: String,

    /// Field selection policy.
    #[serde(default)]
    pub field_policy: FieldPolicy,

    /// Above this many indexes, zero-size indexes are dropped from a query.
    #[serde(default = "default_index_soft_limit")]
    pub index_soft_limit: usize,

    /// Above this many indexes, the index list is truncated.
    #[serde(default = "default_index_hard_limit")]
    pub index_hard_limit: usize,

    /// Row cap of each sort refinement probe.
    #[serde(default = "default_refine_row_cap")]
    pub refine_row_cap: usize,

    /// Spelling suggestions are attempted below this many matches.
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: usize,

    /// Candidates requested per token from the spelling source.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Page size used when a request does not name one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Escalate engine warnings to the caller.
    #[serde(default)]
    pub raise_on_warning: bool,

    /// Escalate engine errors to the caller.
    #[serde(default = "default_true")]
    pub raise_on_error: bool,

    /// Byte cap applied to every value emitted in an external feed.
    #[serde(default = "default_max_feed_value_bytes")]
    pub max_feed_value_bytes: usize,

    /// Staging view used when a request does not ask for one.
    #[serde(default)]
    pub ambient_stage: Stage,

    /// Partition used when a request does not name one.
    #[serde(default)]
    pub ambient_partition: u32,

    /// Options rendered into the `indexer` block.
    #[serde(default = "default_indexer_options")]
    pub indexer_options: BTreeMap<String, String>,

    /// Options rendered into the `searchd` block.
    #[serde(default = "default_searchd_options")]
    pub searchd_options: BTreeMap<String, String>,

    /// Options rendered into the base index block every index inherits.
    #[serde(default = "default_base_index_options")]
    pub base_index_options: BTreeMap<String, String>,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("var/polydex/idx")
}

fn default_var_path() -> PathBuf {
    PathBuf::from("var/polydex")
}

fn default_listen() -> String {
    "127.0.0.1:9312".to_string()
}

fn default_feed_command() -> String {
    "polydex-feed".to_string()
}

fn default_index_soft_limit() -> usize {
    100
}

fn default_index_hard_limit() -> usize {
    250
}

fn default_refine_row_cap() -> usize {
    1000
}

fn default_suggestion_threshold() -> usize {
    10
}

fn default_max_suggestions() -> usize {
    3
}

fn default_page_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_feed_value_bytes() -> usize {
    1048 * 1024 - 1
}

fn default_indexer_options() -> BTreeMap<String, String> {
    BTreeMap::from([("mem_limit".to_string(), "256M".to_string())])
}

fn default_searchd_options() -> BTreeMap<String, String> {
    BTreeMap::from([("max_children".to_string(), "30".to_string())])
}

fn default_base_index_options() -> BTreeMap<String, String> {
    [
        ("morphology", "stem_en"),
        ("html_strip", "1"),
        ("charset_type", "utf-8"),
        ("index_exact_words", "1"),
        ("inplace_enable", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for PolydexConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            var_path: default_var_path(),
            listen: default_listen(),
            feed_command: default_feed_command(),
            field_policy: FieldPolicy::default(),
            index_soft_limit: default_index_soft_limit(),
            index_hard_limit: default_index_hard_limit(),
            refine_row_cap: default_refine_row_cap(),
            suggestion_threshold: default_suggestion_threshold(),
            max_suggestions: default_max_suggestions(),
            default_page_size: default_page_size(),
            raise_on_warning: false,
            raise_on_error: default_true(),
            max_feed_value_bytes: default_max_feed_value_bytes(),
            ambient_stage: Stage::default(),
            ambient_partition: 0,
            indexer_options: default_indexer_options(),
            searchd_options: default_searchd_options(),
            base_index_options: default_base_index_options(),
        }
    }
}

impl PolydexConfig {
    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PolydexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.index_hard_limit < self.index_soft_limit {
            return Err(Error::config(format!(
                "index_hard_limit ({}) must not be below index_soft_limit ({})",
                self.index_hard_limit, self.index_soft_limit
            )));
        }
        if self.default_page_size == 0 {
            return Err(Error::config("default_page_size must be positive"));
        }
        if self.refine_row_cap == 0 {
            return Err(Error::config("refine_row_cap must be positive"));
        }
        Ok(())
    }

    /// Path of the on-disk data file backing an index.
    pub fn index_file(&self, index_name: &str) -> PathBuf {
        self.index_path.join(format!("{index_name}.sph"))
    }
}

// ============================================================================
// Tests
// ============================================================================
