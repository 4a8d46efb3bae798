//! Delta variant.
//!
//! Every non-delta index gets a twin that reads only rows whose
//! `primary_indexed` flag is still 0. Refreshing the primary index first
//! sets the flag on every row it is about to read, so a row is never in both
//! freshly built indexes. Searches read primary and delta together and
//! exclude rows marked `_dirty`: a row written since the last delta refresh
//! is left out of both until that refresh picks it up.

use polydex_core::TypeRegistry;

use crate::fields::PRIMARY_INDEXED_FIELD;
use crate::index::IndexDescriptor;
use crate::query::{IndexSelection, QueryOptions};
use crate::source::{DIRTY_ATTR, Predicate, PreQuery};
use crate::variants::VariantHandler;

/// Derives delta twins and reads them at search time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaHandler;

impl VariantHandler for DeltaHandler {
    fn name(&self) -> &str {
        "delta"
    }

    fn expand_indexes(
        &self,
        _registry: &TypeRegistry,
        base_type: &str,
        indexes: &mut Vec<IndexDescriptor>,
    ) {
        let mut twins = Vec::new();
        for index in indexes.iter_mut().filter(|i| !i.delta) {
            let Some(flag_table) = index.source.flag_table.clone() else {
                log::warn!(
                    "Index {} has no stale flag table, skipping delta twin",
                    index.name()
                );
                continue;
            };

            let clear = PreQuery::ClearStaleFlag {
                flag_table: flag_table.clone(),
                column: PRIMARY_INDEXED_FIELD.to_string(),
                base_table: index.source.base_table.clone(),
                types: index.member_types.clone(),
            };
            if !index.source.pre_queries.contains(&clear) {
                index.source.pre_queries.push(clear.clone());
            }

            let mut twin = index.clone();
            twin.delta = true;
            twin.source.pre_queries.retain(|pre| pre != &clear);
            twin.source.selection.push(Predicate::FlagEquals {
                table: flag_table,
                column: PRIMARY_INDEXED_FIELD.to_string(),
                value: false,
            });
            twins.push(twin);
        }

        for twin in twins {
            if !indexes.iter().any(|i| i.name() == twin.name()) {
                log::debug!("Derived delta index {} for {base_type}", twin.name());
                indexes.push(twin);
            }
        }
    }

    fn expand_search(
        &self,
        _registry: &TypeRegistry,
        selection: &mut IndexSelection,
        options: &mut QueryOptions,
    ) {
        let twins: Vec<_> = selection
            .entries()
            .iter()
            .filter(|entry| !entry.delta)
            .map(|entry| {
                let mut twin = entry.clone();
                twin.delta = true;
                twin
            })
            .collect();
        for twin in twins {
            selection.push(twin);
        }
        options.add_exclude(DIRTY_ATTR, true);
    }
}
