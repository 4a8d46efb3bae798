//! Partition variant.
//!
//! Rows of partitioned base types carry a `partition_id` attribute. The
//! planner scopes a fresh source to the ambient partition; this handler lifts
//! that scoping so one physical index holds every partition, then filters at
//! search time with a computed mismatch column per base type.

use polydex_core::{FieldKind, PartitionScope, TypeRegistry, partition_id};

use crate::fields::{FieldDescriptor, upsert_field};
use crate::index::IndexDescriptor;
use crate::query::{IndexSelection, PartitionChoice, QueryOptions};
use crate::source::{BASE_ID_ATTR, PARTITION_COLUMN, Predicate};
use crate::variants::VariantHandler;

/// Indexes every partition together and filters per search.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionHandler {
    ambient: u32,
}

impl PartitionHandler {
    /// Handler whose default partition is `ambient`.
    pub fn new(ambient: u32) -> Self {
        Self { ambient }
    }
}

/// Name of the computed column flagging rows outside the requested partition.
pub fn mismatch_column(base_type: &str) -> String {
    format!("{base_type}PartitionMismatch")
}

fn visibility_test(scope: PartitionScope, partition: u32) -> Option<String> {
    match scope {
        PartitionScope::None => None,
        PartitionScope::Exact => Some(format!("{PARTITION_COLUMN} = {partition}")),
        PartitionScope::Shared => Some(format!(
            "{PARTITION_COLUMN} = 0 OR {PARTITION_COLUMN} = {partition}"
        )),
    }
}

impl VariantHandler for PartitionHandler {
    fn name(&self) -> &str {
        "partition"
    }

    fn expand_indexes(
        &self,
        _registry: &TypeRegistry,
        base_type: &str,
        indexes: &mut Vec<IndexDescriptor>,
    ) {
        for index in indexes.iter_mut() {
            let before = index.source.selection.len();
            index
                .source
                .selection
                .retain(|p| !matches!(p, Predicate::PartitionScoped { .. }));
            if index.source.selection.len() != before {
                log::debug!("Index {} of {base_type} spans all partitions", index.name());
            }
        }
    }

    fn expand_search(
        &self,
        registry: &TypeRegistry,
        selection: &mut IndexSelection,
        options: &mut QueryOptions,
    ) {
        let partition = match options.partition.unwrap_or(PartitionChoice::Only(self.ambient)) {
            PartitionChoice::All => return,
            PartitionChoice::Only(partition) => partition,
        };

        let mut bases: Vec<String> = Vec::new();
        for entry in selection.entries() {
            if let Some(base) = registry.base_type(&entry.base_index)
                && !bases.contains(&base.name)
            {
                bases.push(base.name.clone());
            }
        }

        for base in bases {
            let Some(test) = visibility_test(registry.partition_scope(&base), partition) else {
                continue;
            };
            let column = mismatch_column(&base);
            options.add_select(format!(
                "IF({BASE_ID_ATTR} = {} AND NOT({test}), 1, 0) AS {column}",
                partition_id(&base)
            ));
            options.add_exclude(column, 1u64);
        }
    }

    fn expand_fields(
        &self,
        registry: &TypeRegistry,
        type_name: &str,
        fields: &mut Vec<FieldDescriptor>,
    ) {
        if registry.partition_scope(type_name) == PartitionScope::None {
            return;
        }
        let Some(base) = registry.base_type(type_name) else {
            return;
        };
        upsert_field(
            fields,
            FieldDescriptor::stored(PARTITION_COLUMN, FieldKind::Integer, &base.name, true, false),
        );
    }
}
