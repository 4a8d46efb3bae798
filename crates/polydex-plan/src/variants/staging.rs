//! Staging variant.
//!
//! Types with a draft/published duality get a second physical index built
//! from the published tables (`<table>_Live`). Searches read it only when the
//! published view is requested, falling back to the ambient view.

use polydex_core::{Stage, TypeRegistry};

use crate::index::IndexDescriptor;
use crate::query::{IndexSelection, QueryOptions};
use crate::variants::VariantHandler;

/// Suffix of published-snapshot tables.
pub const PUBLISHED_TABLE_SUFFIX: &str = "_Live";

/// Derives published-snapshot copies of staged indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagingHandler {
    ambient: Stage,
}

impl StagingHandler {
    /// Handler whose default view is `ambient`.
    pub fn new(ambient: Stage) -> Self {
        Self { ambient }
    }
}

impl VariantHandler for StagingHandler {
    fn name(&self) -> &str {
        "staging"
    }

    fn expand_indexes(
        &self,
        registry: &TypeRegistry,
        base_type: &str,
        indexes: &mut Vec<IndexDescriptor>,
    ) {
        if !registry.is_staged(base_type) {
            return;
        }

        let copies: Vec<IndexDescriptor> = indexes
            .iter()
            .filter(|i| !i.staged)
            .map(|index| {
                let mut copy = index.clone();
                copy.staged = true;
                copy.source
                    .rename_tables(|table| format!("{table}{PUBLISHED_TABLE_SUFFIX}"));
                copy
            })
            .collect();

        for copy in copies {
            if !indexes.iter().any(|i| i.name() == copy.name()) {
                log::debug!("Derived published index {} for {base_type}", copy.name());
                indexes.push(copy);
            }
        }
    }

    fn expand_search(
        &self,
        registry: &TypeRegistry,
        selection: &mut IndexSelection,
        options: &mut QueryOptions,
    ) {
        if options.stage.unwrap_or(self.ambient) != Stage::Published {
            return;
        }
        for entry in selection.entries_mut() {
            if registry.is_staged(&entry.base_index) {
                entry.staged = true;
            }
        }
    }
}
