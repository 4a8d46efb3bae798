//! Handler functions for the CLI subcommands.
//!
//! Every handler returns the text it wants printed so the dispatch in
//! `main` stays the only place that writes to stdout.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use polydex_core::{PolydexConfig, TypeRegistry};
use polydex_plan::{IndexDescriptor, IndexPlanner, render_artifact};
use serde::Serialize;

/// Default name of the rendered engine configuration.
pub const ARTIFACT_FILE: &str = "polydex.conf";

// ============================================================================
// Loading
// ============================================================================

/// Configuration from `path`, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<PolydexConfig> {
    match path {
        Some(path) => PolydexConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Ok(PolydexConfig::default())
        }
    }
}

/// Planner over the type registry at `types`.
pub fn load_planner(config: &PolydexConfig, types: &Path) -> Result<IndexPlanner> {
    let registry = TypeRegistry::load(types)
        .with_context(|| format!("loading record types from {}", types.display()))?;
    Ok(IndexPlanner::new(Arc::new(registry), config))
}

// ============================================================================
// plan
// ============================================================================

/// One physical index as reported by `plan`.
#[derive(Debug, Serialize)]
pub struct PlannedIndex {
    /// Physical index name.
    pub name: String,
    /// Primary, delta or staged.
    pub kind: String,
    /// Chosen base type.
    pub base_type: String,
    /// Types whose rows the index holds.
    pub members: Vec<String>,
    /// Shared field signature.
    pub signature: String,
}

impl From<&IndexDescriptor> for PlannedIndex {
    fn from(index: &IndexDescriptor) -> Self {
        Self {
            name: index.name(),
            kind: index.kind().to_string(),
            base_type: index.base_type.clone(),
            members: index.member_types.clone(),
            signature: index.signature.to_string(),
        }
    }
}

/// Physical indexes of `types` (all searchable types when empty).
pub fn plan(planner: &IndexPlanner, types: &[String], json: bool) -> Result<String> {
    let names: Vec<&str> = types.iter().map(String::as_str).collect();
    let scope = (!names.is_empty()).then_some(names.as_slice());
    let indexes: Vec<PlannedIndex> = planner
        .physical_indexes(scope)?
        .iter()
        .map(PlannedIndex::from)
        .collect();

    if json {
        return Ok(serde_json::to_string_pretty(&indexes)?);
    }

    let width = indexes.iter().map(|i| i.name.len()).max().unwrap_or(4).max(4);
    let mut out = String::new();
    writeln!(out, "{:<width$}  {:<7}  MEMBERS", "NAME", "KIND")?;
    for index in &indexes {
        writeln!(
            out,
            "{:<width$}  {:<7}  {}",
            index.name,
            index.kind,
            index.members.join(", ")
        )?;
    }
    write!(out, "{} physical index(es)", indexes.len())?;
    Ok(out)
}

// ============================================================================
// configure
// ============================================================================

/// Render the engine configuration and write it to `output`, or to
/// `<var_path>/polydex.conf`. Returns the written path.
pub async fn configure(
    config: &PolydexConfig,
    planner: &IndexPlanner,
    output: Option<&Path>,
) -> Result<PathBuf> {
    planner.check()?;
    let artifact = render_artifact(config, &planner.physical_indexes(None)?);

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.var_path.join(ARTIFACT_FILE));
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    tokio::fs::write(&path, artifact)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Wrote engine configuration to {}", path.display());
    Ok(path)
}

/// Render the engine configuration without writing it.
pub fn render(config: &PolydexConfig, planner: &IndexPlanner) -> Result<String> {
    planner.check()?;
    Ok(render_artifact(config, &planner.physical_indexes(None)?))
}

// ============================================================================
// check
// ============================================================================

/// Validate the configuration, the type registry and partition ids.
pub fn check(config: &PolydexConfig, planner: &IndexPlanner) -> Result<String> {
    config.validate()?;
    planner.registry().validate()?;
    planner.check()?;
    let searchable = planner.searchable_types().len();
    let indexes = planner.physical_indexes(None)?.len();
    Ok(format!(
        "OK: {} record type(s), {searchable} searchable, {indexes} physical index(es)",
        planner.registry().len()
    ))
}

// ============================================================================
// Tests
// ============================================================================
