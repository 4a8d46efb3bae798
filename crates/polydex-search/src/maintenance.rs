//! Incremental index maintenance.
//!
//! Writes reach the indexes through two calls. [`IndexMaintainer::mark_stale`]
//! hides the written row from the primary indexes (their `_dirty` attribute
//! is set in place) and records the delta twins that must be rebuilt to pick
//! the row up again. [`IndexMaintainer::refresh_indexes`] rebuilds indexes and,
//! when the rebuild output is clean, the spelling dictionary.
//!
//! Callers own the [`RefreshBatch`] and decide when to flush it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polydex_core::{GlobalDocumentId, Result};
use polydex_plan::{DIRTY_ATTR, IndexPlanner, PRIMARY_INDEXED_FIELD, RowSource};

use crate::backend::SearchEngine;

/// Indexer output line that is always present and harmless.
const BENIGN_INDEXER_ERROR: &str = "ERROR: index 'BaseIdx': key 'path' not found.";

/// Whether indexer output reports a failed rebuild.
pub fn detect_indexing_error(output: &str) -> bool {
    output.lines().any(|line| {
        (line.starts_with("ERROR:") && line != BENIGN_INDEXER_ERROR)
            || line.starts_with("FATAL:")
            || line.starts_with("WARNING:")
            || line.contains("Permission denied")
            || line.contains("Segmentation fault")
    })
}

/// Runs the engine's indexer.
#[async_trait]
pub trait IndexBuilderBackend: Send + Sync {
    /// Rebuild the named indexes. Returns the indexer's output.
    async fn rebuild(&self, indexes: &[String]) -> Result<String>;

    /// Rebuild the spelling dictionary from the vocabulary of the named
    /// indexes.
    async fn rebuild_dictionary(&self, indexes: &[String]) -> Result<()>;
}

/// Index names waiting for a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshBatch {
    indexes: BTreeSet<String>,
}

impl RefreshBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an index.
    pub fn add(&mut self, index: impl Into<String>) {
        self.indexes.insert(index.into());
    }

    /// Queued names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.indexes.iter().cloned().collect()
    }

    /// Number of queued indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Remove and return every queued name.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.indexes).into_iter().collect()
    }
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Indexes rebuilt.
    pub indexes: Vec<String>,
    /// Indexer output.
    pub output: String,
    /// Whether the output reported an error.
    pub failed: bool,
    /// Whether the spelling dictionary was rebuilt.
    pub dictionary_rebuilt: bool,
    /// When the rebuild finished.
    pub finished_at: DateTime<Utc>,
}

/// Keeps indexes in step with writes.
pub struct IndexMaintainer {
    planner: Arc<IndexPlanner>,
    engine: Arc<dyn SearchEngine>,
    builder: Arc<dyn IndexBuilderBackend>,
    rows: Option<Arc<dyn RowSource>>,
    suspended: AtomicBool,
}

impl std::fmt::Debug for IndexMaintainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMaintainer")
            .field("engine", &self.engine.name())
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}

impl IndexMaintainer {
    /// Create a maintainer.
    pub fn new(
        planner: Arc<IndexPlanner>,
        engine: Arc<dyn SearchEngine>,
        builder: Arc<dyn IndexBuilderBackend>,
    ) -> Self {
        Self {
            planner,
            engine,
            builder,
            rows: None,
            suspended: AtomicBool::new(false),
        }
    }

    /// Also clear the `primary_indexed` flag of written rows through `rows`.
    /// Without it the record store is expected to clear the flag on write.
    pub fn with_rows(mut self, rows: Arc<dyn RowSource>) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Flag a written row for delta pickup and queue the indexes to rebuild.
    pub async fn mark_stale(
        &self,
        type_name: &str,
        local_id: u32,
        batch: &mut RefreshBatch,
    ) -> Result<()> {
        if self.is_suspended() {
            log::debug!("Indexing suspended, ignoring write to {type_name} #{local_id}");
            return Ok(());
        }

        let indexes = self.planner.indexes_for_type(type_name)?;
        let registry = self.planner.registry();
        let root = registry
            .base_type(type_name)
            .map(|def| def.name.as_str())
            .unwrap_or(type_name);
        let id = GlobalDocumentId::for_type(root, local_id);

        if let Some(rows) = &self.rows {
            let tables: BTreeSet<&str> = indexes
                .iter()
                .filter_map(|index| index.source.flag_table.as_deref())
                .collect();
            for table in tables {
                rows.execute(&format!(
                    "UPDATE `{table}` SET `{table}`.`{PRIMARY_INDEXED_FIELD}` = 0 WHERE `{table}`.`ID` = {local_id}"
                ))
                .await?;
            }
        }

        let has_delta = indexes.iter().any(|index| index.delta);
        for index in &indexes {
            let name = index.name();
            if index.delta {
                batch.add(name);
            } else {
                let updated = self
                    .engine
                    .update_attributes(&name, DIRTY_ATTR, &[(id, 1)])
                    .await?;
                log::debug!("Marked {id} dirty in {name} ({updated} document(s))");
                if !has_delta {
                    batch.add(name);
                }
            }
        }
        Ok(())
    }

    /// Rebuild the named indexes, or every planned index, then the spelling
    /// dictionary unless the rebuild reported an error.
    pub async fn refresh_indexes(&self, indexes: Option<&[String]>) -> Result<RefreshReport> {
        let names: Vec<String> = match indexes {
            Some(names) => names.to_vec(),
            None => self
                .planner
                .physical_indexes(None)?
                .iter()
                .map(|index| index.name())
                .collect(),
        };

        log::info!("Rebuilding {} index(es)", names.len());
        let output = self.builder.rebuild(&names).await?;
        let failed = detect_indexing_error(&output);

        let dictionary_rebuilt = if failed {
            log::warn!("Indexer reported errors, dictionary not rebuilt:\n{output}");
            false
        } else {
            self.builder.rebuild_dictionary(&names).await?;
            true
        };

        let report = RefreshReport {
            indexes: names,
            output,
            failed,
            dictionary_rebuilt,
            finished_at: Utc::now(),
        };
        log::info!(
            "Rebuild of {} index(es) finished at {}{}",
            report.indexes.len(),
            report.finished_at.to_rfc3339(),
            if failed { " with errors" } else { "" }
        );
        Ok(report)
    }

    /// Rebuild and empty a batch. Returns `None` for an empty batch.
    pub async fn flush(&self, batch: &mut RefreshBatch) -> Result<Option<RefreshReport>> {
        if batch.is_empty() {
            return Ok(None);
        }
        let names = batch.take();
        self.refresh_indexes(Some(&names)).await.map(Some)
    }

    /// Stop tracking writes, for bulk imports.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        log::info!("Index maintenance suspended");
    }

    /// Resume tracking writes. Writes made while suspended were not tracked,
    /// so every index is rebuilt.
    pub async fn resume(&self) -> Result<RefreshReport> {
        self.suspended.store(false, Ordering::SeqCst);
        log::info!("Index maintenance resumed");
        self.refresh_indexes(None).await
    }

    /// Whether writes are currently ignored.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
