//! Index planning.
//!
//! The planner collapses a set of searchable types into the smallest set of
//! physical indexes. Types are grouped by [`Signature`]; within a group the
//! most ancestral member becomes the chosen base and names the index.
//!
//! ```text
//!   types ──► signature ──► group by signature + ancestry ──► cache (by base)
//!                                                                  │
//!                                   expand_fields / expand_indexes ◄┘
//! ```
//!
//! Built descriptors are cached by chosen base. The cache only grows; call
//! [`IndexPlanner::clear_cache`] after loading a different configuration.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use polydex_core::{
    Error, PartitionScope, PolydexConfig, Result, TypeRegistry, check_collisions,
};

use crate::fields::{FieldDescriptor, FieldIntrospector};
use crate::index::{IndexDescriptor, VariantKind};
use crate::query::{IndexSelection, QueryOptions, SelectedIndex};
use crate::signature::{Signature, SignatureBuilder};
use crate::source::{DataSource, PARTITION_COLUMN, Predicate};
use crate::variants::VariantPipeline;

/// One signature group found while planning.
#[derive(Debug, Clone)]
struct Group {
    signature: Signature,
    base: String,
    members: Vec<String>,
}

/// A planned index and everything derived from it.
#[derive(Debug, Clone)]
struct CachedPlan {
    signature: Signature,
    members: Vec<String>,
    indexes: Vec<IndexDescriptor>,
}

/// Plans physical indexes for searchable types.
#[derive(Debug)]
pub struct IndexPlanner {
    registry: Arc<TypeRegistry>,
    introspector: FieldIntrospector,
    signatures: SignatureBuilder,
    pipeline: VariantPipeline,
    ambient_partition: u32,
    cache: RwLock<BTreeMap<String, CachedPlan>>,
}

impl IndexPlanner {
    /// Planner with the standard variant pipeline.
    pub fn new(registry: Arc<TypeRegistry>, config: &PolydexConfig) -> Self {
        Self::with_pipeline(registry, config, VariantPipeline::standard(config))
    }

    /// Planner with an explicit variant pipeline.
    pub fn with_pipeline(
        registry: Arc<TypeRegistry>,
        config: &PolydexConfig,
        pipeline: VariantPipeline,
    ) -> Self {
        let introspector = FieldIntrospector::new(Arc::clone(&registry), config.field_policy);
        Self {
            signatures: SignatureBuilder::new(introspector.clone()),
            introspector,
            registry,
            pipeline,
            ambient_partition: config.ambient_partition,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// The type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The variant pipeline.
    pub fn pipeline(&self) -> &VariantPipeline {
        &self.pipeline
    }

    /// Field schema of a type, including variant-injected fields.
    pub fn fields(&self, type_name: &str) -> Vec<FieldDescriptor> {
        let mut fields = self.introspector.fields(type_name);
        self.pipeline
            .expand_fields(&self.registry, type_name, &mut fields);
        fields
    }

    /// Signature of a type over its full field schema.
    pub fn signature(&self, type_name: &str) -> Signature {
        self.signatures
            .signature_with_fields(type_name, &self.fields(type_name))
    }

    /// Searchable types with storage, in declaration order.
    pub fn searchable_types(&self) -> Vec<String> {
        self.registry
            .searchable_types()
            .into_iter()
            .filter(|def| def.storage)
            .map(|def| def.name.clone())
            .collect()
    }

    /// Primary index descriptors covering `types` and their searchable
    /// descendants, or every searchable type when `types` is `None`.
    ///
    /// Descriptors are ordered by the declaration position of their base.
    pub fn plan(&self, types: Option<&[&str]>) -> Result<Vec<IndexDescriptor>> {
        Ok(self
            .physical_indexes(types)?
            .into_iter()
            .filter(|index| index.kind() == VariantKind::Primary)
            .collect())
    }

    /// Every physical index, primaries followed by their derived variants.
    pub fn physical_indexes(&self, types: Option<&[&str]>) -> Result<Vec<IndexDescriptor>> {
        let resolved = self.resolve(types)?;
        let groups = self.group(&resolved);

        let mut cache = self
            .cache
            .write()
            .map_err(|e| Error::operation(format!("index cache poisoned: {e}")))?;

        let mut out = Vec::new();
        for group in groups {
            let reusable = cache.get(&group.base).filter(|cached| {
                cached.signature == group.signature
                    && group.members.iter().all(|m| cached.members.contains(m))
            });
            let indexes = match reusable {
                Some(cached) => cached.indexes.clone(),
                None => {
                    let mut members = group.members.clone();
                    if let Some(previous) = cache.get(&group.base)
                        && previous.signature == group.signature
                    {
                        for member in &previous.members {
                            if !members.contains(member) {
                                members.push(member.clone());
                            }
                        }
                    }
                    self.sort_by_position(&mut members);
                    let indexes = self.build(&group.base, &group.signature, &members);
                    log::debug!(
                        "Planned {} physical index(es) for {} ({} member type(s))",
                        indexes.len(),
                        group.base,
                        members.len()
                    );
                    cache.insert(
                        group.base.clone(),
                        CachedPlan {
                            signature: group.signature.clone(),
                            members,
                            indexes: indexes.clone(),
                        },
                    );
                    indexes
                }
            };
            out.extend(indexes);
        }
        Ok(out)
    }

    /// Every physical index holding rows of `type_name`.
    pub fn indexes_for_type(&self, type_name: &str) -> Result<Vec<IndexDescriptor>> {
        self.registry.require(type_name)?;
        Ok(self
            .physical_indexes(None)?
            .into_iter()
            .filter(|index| index.contains_type(type_name))
            .collect())
    }

    /// Primary index selection for a set of concrete types, drawn from the
    /// full plan. Types without a planned index are left out.
    pub fn selection(&self, types: &[String]) -> Result<IndexSelection> {
        let primaries = self.plan(None)?;

        let mut selection = IndexSelection::new();
        for type_name in types {
            match primaries.iter().find(|index| index.contains_type(type_name)) {
                Some(index) => selection.push(SelectedIndex::primary(type_name, &index.base_type)),
                None => log::debug!("No index holds {type_name}"),
            }
        }
        Ok(selection)
    }

    /// Let the variant pipeline adjust a search.
    pub fn expand_search(&self, selection: &mut IndexSelection, options: &mut QueryOptions) {
        self.pipeline
            .expand_search(&self.registry, selection, options);
    }

    /// Fail when two base types share a partition id.
    pub fn check(&self) -> Result<()> {
        let mut bases: Vec<&str> = Vec::new();
        for def in self.registry.searchable_types() {
            if let Some(base) = self.registry.base_type(&def.name)
                && !bases.contains(&base.name.as_str())
            {
                bases.push(&base.name);
            }
        }
        check_collisions(bases)
    }

    /// Forget every cached plan.
    pub fn clear_cache(&self) {
        match self.cache.write() {
            Ok(mut cache) => cache.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn resolve(&self, types: Option<&[&str]>) -> Result<Vec<String>> {
        let Some(types) = types else {
            return Ok(self.searchable_types());
        };

        let mut resolved = Vec::new();
        for &name in types {
            let def = self.registry.require(name)?;
            let candidates = std::iter::once(def).chain(self.registry.descendants(name));
            for candidate in candidates {
                if candidate.storage
                    && self.registry.is_searchable(&candidate.name)
                    && !resolved.contains(&candidate.name)
                {
                    resolved.push(candidate.name.clone());
                }
            }
        }
        self.sort_by_position(&mut resolved);
        Ok(resolved)
    }

    fn group(&self, types: &[String]) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();

        for type_name in types {
            let signature = self.signature(type_name);

            if let Some(group) = groups.iter_mut().find(|g| {
                g.signature == signature
                    && (g.base == *type_name || self.registry.is_ancestor(&g.base, type_name))
            }) {
                if !group.members.contains(type_name) {
                    group.members.push(type_name.clone());
                }
                continue;
            }

            let (promoted, rest): (Vec<Group>, Vec<Group>) =
                groups.into_iter().partition(|g| {
                    g.signature == signature && self.registry.is_ancestor(type_name, &g.base)
                });
            groups = rest;

            if promoted.is_empty() {
                if groups.iter().any(|g| g.signature == signature) {
                    let err = Error::planning_inconsistency(format!(
                        "{type_name} shares signature {signature} with an unrelated type; indexed separately"
                    ));
                    log::warn!("{err}");
                }
                groups.push(Group {
                    signature,
                    base: type_name.clone(),
                    members: vec![type_name.clone()],
                });
            } else {
                let mut members = vec![type_name.clone()];
                for group in promoted {
                    members.extend(group.members);
                }
                groups.push(Group {
                    signature,
                    base: type_name.clone(),
                    members,
                });
            }
        }

        groups.sort_by_key(|g| self.registry.position(&g.base).unwrap_or(usize::MAX));
        groups
    }

    fn build(&self, base: &str, signature: &Signature, members: &[String]) -> Vec<IndexDescriptor> {
        let fields = self.fields(base);
        let mut source = DataSource::build(&self.registry, base, members, &fields);
        if self.registry.partition_scope(base) != PartitionScope::None {
            source.selection.push(Predicate::PartitionScoped {
                table: source.base_table.clone(),
                column: PARTITION_COLUMN.to_string(),
                partition: self.ambient_partition,
            });
        }

        let mut indexes = vec![IndexDescriptor {
            base_type: base.to_string(),
            member_types: members.to_vec(),
            fields,
            mode: self.registry.index_mode(base),
            signature: signature.clone(),
            source,
            staged: false,
            delta: false,
        }];
        self.pipeline
            .expand_indexes(&self.registry, base, &mut indexes);
        indexes
    }

    fn sort_by_position(&self, names: &mut [String]) {
        names.sort_by_key(|name| self.registry.position(name).unwrap_or(usize::MAX));
    }
}

// ============================================================================
// Tests
// ============================================================================
