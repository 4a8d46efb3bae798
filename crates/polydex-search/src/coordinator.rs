//! Query coordination.
//!
//! `QueryCoordinator::search` turns a logical request into one engine call:
//!
//! 1. resolve the requested types (and descendants) to searchable, stored types
//! 2. select each type's physical index and let the variant pipeline adjust it
//! 3. bound the index list (empty indexes dropped, then truncation)
//! 4. translate filters, projections, sort and paging
//! 5. decode global ids and resolve live records
//! 6. refine string sorts, record engine messages, suggest spellings
//!
//! Engine warnings and errors are recorded on the result. When escalation is
//! configured the fully assembled result is returned inside
//! [`Error::Escalated`].

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use polydex_core::{Error as CoreError, PartitionMap, PolydexConfig, packed_column};
use polydex_plan::{
    BASE_ID_ATTR, CLASS_ID_ATTR, FilterValue, IndexPlanner, IndexSelection, LOCAL_ID_ATTR,
    QueryOptions,
};

use crate::backend::{EngineFilter, EngineMatch, EngineQuery, EngineSort, SearchEngine};
use crate::error::{Error, Result};
use crate::record::RecordStore;
use crate::refine::{SortKeyField, SortRefiner, TieGroup, TieProbe};
use crate::suggest::{RerunSearch, SpellingSource, SpellingSuggester};
use crate::types::{Hit, SearchRequest, SearchResult, SortSpec};

/// Executes logical searches against the engine.
pub struct QueryCoordinator {
    planner: Arc<IndexPlanner>,
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RecordStore>,
    speller: Option<Arc<dyn SpellingSource>>,
    config: PolydexConfig,
}

impl std::fmt::Debug for QueryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCoordinator")
            .field("engine", &self.engine.name())
            .field("speller", &self.speller.is_some())
            .finish_non_exhaustive()
    }
}

/// Row decoding context of one search.
struct Decoder {
    classes: PartitionMap,
    bases: PartitionMap,
}

impl QueryCoordinator {
    /// Create a coordinator.
    pub fn new(
        planner: Arc<IndexPlanner>,
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RecordStore>,
        config: PolydexConfig,
    ) -> Self {
        Self {
            planner,
            engine,
            store,
            speller: None,
            config,
        }
    }

    /// Attach a spelling candidate source.
    pub fn with_speller(mut self, speller: Arc<dyn SpellingSource>) -> Self {
        self.speller = Some(speller);
        self
    }

    /// The planner searches are resolved through.
    pub fn planner(&self) -> &Arc<IndexPlanner> {
        &self.planner
    }

    /// Run a search.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let page_size = request.page_size.unwrap_or(self.config.default_page_size);
        let offset = request.offset(page_size);
        let mut result = SearchResult::empty(offset, page_size);

        let types = self.resolve_types(request)?;
        if types.is_empty() {
            log::debug!("No searchable types for {:?}", request.types);
            return Ok(result);
        }

        let mut selection = self.planner.selection(&types)?;
        let mut options = request.options.clone();
        self.planner.expand_search(&mut selection, &mut options);
        if selection.is_empty() {
            return Ok(result);
        }
        self.restrict_types(&selection, &types, &mut options)?;

        let indexes = self.bound_indexes(selection.index_names()).await;
        let (sort, keys) = self.sort_keys(&request.sort, &selection);

        let mut select = vec![
            LOCAL_ID_ATTR.to_string(),
            BASE_ID_ATTR.to_string(),
            CLASS_ID_ATTR.to_string(),
        ];
        select.extend(options.select.iter().cloned());
        for key in keys.iter().filter(|k| k.packed) {
            if !select.contains(&key.attribute) {
                select.push(key.attribute.clone());
            }
        }

        let query = EngineQuery {
            text: request.query.clone(),
            indexes: indexes.clone(),
            filters: engine_filters(&options),
            select,
            sort,
            offset,
            limit: page_size,
        };
        let response = self.engine.query(&query).await?;

        let decoder = self.decoder(&types, &selection);
        let returned = response.matches.len();
        let mut matches = self.resolve_hits(response.matches, &decoder).await?;
        let dropped = returned - matches.len();

        if keys.iter().any(|k| k.packed) {
            let probe = Probe {
                coordinator: self,
                query: &query,
                decoder: &decoder,
            };
            matches = SortRefiner::new(self.config.refine_row_cap)
                .refine(matches, response.total.saturating_sub(dropped), &keys, &probe)
                .await;
        }

        result.matches = matches;
        result.total = response.total;
        result.indexes = indexes;
        if let Some(warning) = &response.warning {
            log::warn!("Engine warning for '{}': {warning}", request.query);
        }
        if let Some(error) = &response.error {
            log::warn!("Engine error for '{}': {error}", request.query);
        }
        result.warning = response.warning;
        result.error = response.error;

        if request.suggestions
            && result.total < self.config.suggestion_threshold
            && let Some(speller) = &self.speller
        {
            let rerun = Rerun {
                coordinator: self,
                query: &query,
            };
            result.suggestion = SpellingSuggester::new(self.config.max_suggestions)
                .suggest(&request.query, result.total, speller.as_ref(), &rerun)
                .await;
        }

        self.escalate(result)
    }

    /// Requested types, with descendants unless disabled, restricted to
    /// searchable types with storage.
    fn resolve_types(&self, request: &SearchRequest) -> Result<Vec<String>> {
        let registry = self.planner.registry();
        let mut types: Vec<String> = Vec::new();
        for name in &request.types {
            let def = registry.require(name)?;
            let mut candidates = vec![def];
            if request.include_descendants {
                candidates.extend(registry.descendants(name));
            }
            for candidate in candidates {
                if candidate.storage
                    && registry.is_searchable(&candidate.name)
                    && !types.contains(&candidate.name)
                {
                    types.push(candidate.name.clone());
                }
            }
        }
        Ok(types)
    }

    /// Require the requested types when a selected index also holds others.
    fn restrict_types(
        &self,
        selection: &IndexSelection,
        types: &[String],
        options: &mut QueryOptions,
    ) -> Result<()> {
        if options.require.contains_key(CLASS_ID_ATTR) {
            return Ok(());
        }
        let bases: BTreeSet<&str> = selection
            .entries()
            .iter()
            .map(|e| e.base_index.as_str())
            .collect();
        let foreign = self
            .planner
            .plan(None)?
            .into_iter()
            .filter(|index| bases.contains(index.base_type.as_str()))
            .flat_map(|index| index.member_types)
            .any(|member| !types.contains(&member));
        if foreign {
            for name in types {
                options.add_require(CLASS_ID_ATTR, FilterValue::Text(name.clone()));
            }
        }
        Ok(())
    }

    /// Drop empty indexes above the soft limit and truncate above the hard
    /// limit.
    async fn bound_indexes(&self, names: Vec<String>) -> Vec<String> {
        let mut names = names;
        if names.len() > self.config.index_soft_limit {
            let before = names.len();
            let mut kept = Vec::with_capacity(before);
            for name in names {
                match tokio::fs::metadata(self.config.index_file(&name)).await {
                    Ok(meta) if meta.len() == 0 => {}
                    _ => kept.push(name),
                }
            }
            if kept.len() < before {
                log::info!(
                    "Dropped {} empty index(es) from a query over {before} indexes",
                    before - kept.len()
                );
            }
            names = kept;
        }
        if names.len() > self.config.index_hard_limit {
            log::warn!(
                "Query spans {} indexes, truncating to {}; matches in the rest are not returned",
                names.len(),
                self.config.index_hard_limit
            );
            names.truncate(self.config.index_hard_limit);
        }
        names
    }

    /// Engine sort and refiner keys of a request.
    fn sort_keys(
        &self,
        sort: &SortSpec,
        selection: &IndexSelection,
    ) -> (EngineSort, Vec<SortKeyField>) {
        match sort {
            SortSpec::Relevance => (EngineSort::Relevance, Vec::new()),
            SortSpec::Expression(clause) => (EngineSort::Expression(clause.clone()), Vec::new()),
            SortSpec::Fields(fields) => {
                let bases: BTreeSet<&str> = selection
                    .entries()
                    .iter()
                    .map(|e| e.base_index.as_str())
                    .collect();
                let descriptors: Vec<_> = bases
                    .into_iter()
                    .flat_map(|base| self.planner.fields(base))
                    .collect();
                let keys: Vec<SortKeyField> = fields
                    .iter()
                    .map(|field| {
                        let packed = descriptors
                            .iter()
                            .any(|d| d.name == field.name && d.needs_packed_key());
                        SortKeyField {
                            name: field.name.clone(),
                            attribute: if packed {
                                packed_column(&field.name)
                            } else {
                                field.name.clone()
                            },
                            packed,
                            descending: field.descending,
                        }
                    })
                    .collect();
                let engine = keys
                    .iter()
                    .map(|k| (k.attribute.clone(), k.descending))
                    .collect();
                (EngineSort::Attributes(engine), keys)
            }
        }
    }

    fn decoder(&self, types: &[String], selection: &IndexSelection) -> Decoder {
        let registry = self.planner.registry();
        let bases: BTreeSet<&str> = selection
            .entries()
            .iter()
            .filter_map(|e| registry.base_type(&e.base_index))
            .map(|def| def.name.as_str())
            .collect();
        Decoder {
            classes: PartitionMap::new(types.iter().map(String::as_str)),
            bases: PartitionMap::new(bases),
        }
    }

    /// Resolve engine matches to live records, dropping the ones that no
    /// longer resolve.
    async fn resolve_hits(&self, matches: Vec<EngineMatch>, decoder: &Decoder) -> Result<Vec<Hit>> {
        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let type_name = m
                .attribute(CLASS_ID_ATTR)
                .and_then(|crc| u32::try_from(crc).ok())
                .and_then(|crc| decoder.classes.resolve(crc))
                .or_else(|| decoder.bases.resolve(m.id.partition()));
            let Some(type_name) = type_name else {
                log::debug!("Dropping hit {}: unknown type", m.id);
                continue;
            };
            let local_id = m
                .attribute(LOCAL_ID_ATTR)
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or_else(|| m.id.local_id());

            match self.store.resolve(type_name, local_id).await? {
                Some(record) => hits.push(Hit {
                    id: m.id,
                    attributes: m.attributes,
                    record,
                }),
                None => log::debug!("Dropping hit {}: {type_name} #{local_id} is gone", m.id),
            }
        }
        Ok(hits)
    }

    fn escalate(&self, result: SearchResult) -> Result<SearchResult> {
        if self.config.raise_on_error
            && let Some(message) = result.error.clone()
        {
            return Err(Error::Escalated {
                severity: "error",
                message,
                result: Box::new(result),
            });
        }
        if self.config.raise_on_warning
            && let Some(message) = result.warning.clone()
        {
            return Err(Error::Escalated {
                severity: "warning",
                message,
                result: Box::new(result),
            });
        }
        Ok(result)
    }
}

fn engine_filters(options: &QueryOptions) -> Vec<EngineFilter> {
    let require = options.require.iter().map(|(attribute, values)| {
        EngineFilter::require(attribute, values.iter().map(FilterValue::to_engine).collect())
    });
    let exclude = options.exclude.iter().map(|(attribute, values)| {
        EngineFilter::exclude(attribute, values.iter().map(FilterValue::to_engine).collect())
    });
    require.chain(exclude).collect()
}

/// Tie-group probe scoped to one search.
struct Probe<'a> {
    coordinator: &'a QueryCoordinator,
    query: &'a EngineQuery,
    decoder: &'a Decoder,
}

#[async_trait]
impl TieProbe for Probe<'_> {
    async fn probe(&self, key: &[(String, u64)], limit: usize) -> polydex_core::Result<TieGroup> {
        let mut query = self.query.clone();
        for (attribute, value) in key {
            query
                .filters
                .push(EngineFilter::require(attribute.clone(), vec![*value]));
        }
        query.offset = 0;
        query.limit = limit;

        let response = self.coordinator.engine.query(&query).await?;
        if let Some(error) = response.error {
            return Err(CoreError::engine(error));
        }
        let hits = self
            .coordinator
            .resolve_hits(response.matches, self.decoder)
            .await
            .map_err(|e| match e {
                Error::Core(core) => core,
                other => CoreError::operation(other.to_string()),
            })?;
        Ok(TieGroup {
            hits,
            total: response.total,
        })
    }
}

/// Re-runs a search with different text for the spelling suggester.
struct Rerun<'a> {
    coordinator: &'a QueryCoordinator,
    query: &'a EngineQuery,
}

#[async_trait]
impl RerunSearch for Rerun<'_> {
    async fn total(&self, text: &str) -> polydex_core::Result<usize> {
        let query = EngineQuery {
            text: text.to_string(),
            offset: 0,
            limit: 1,
            ..self.query.clone()
        };
        let response = self.coordinator.engine.query(&query).await?;
        match response.error {
            Some(error) => Err(CoreError::engine(error)),
            None => Ok(response.total),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
