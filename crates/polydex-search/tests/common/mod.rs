//! Common test utilities and harness for Polydex search integration tests.
//!
//! The harness wires the real planner, coordinator and maintainer to an
//! in-memory engine and a small fake database. [`FakeIndexer`] plays the
//! indexer: it reads physical index descriptors and fills the engine the way
//! the generated sources would, including the `primary_indexed` flag
//! handshake between primary and delta indexes.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polydex_core::{
    Error as CoreError, FieldKind, GlobalDocumentId, PartitionScope, PolydexConfig,
    Result as CoreResult, SearchSettings, TypeDefinition, TypeRegistry, packed_column, packed_key,
    partition_id,
};
use polydex_plan::{
    BASE_ID_ATTR, CLASS_ID_ATTR, DIRTY_ATTR, IndexDescriptor, IndexPlanner, LOCAL_ID_ATTR, Row,
    RowSource,
};
use polydex_search::{
    IndexBuilderBackend, IndexMaintainer, MemoryDocument, MemoryEngine, MemoryStore,
    QueryCoordinator, Record, RefreshBatch, SpellingSource,
};
use regex::Regex;

/// Articles with a same-signature and a distinct-signature descendant, and a
/// partitioned shop type.
pub fn registry() -> Arc<TypeRegistry> {
    let sorted = SearchSettings {
        sort_fields: vec!["Title".into()],
        ..Default::default()
    };
    Arc::new(
        TypeRegistry::new(vec![
            TypeDefinition::new("Article")
                .searchable()
                .staged()
                .with_field("Title", FieldKind::Text)
                .with_field("Rating", FieldKind::Integer)
                .with_search(sorted.clone()),
            TypeDefinition::new("NewsArticle").with_parent("Article"),
            TypeDefinition::new("SpecialArticle")
                .with_parent("Article")
                .with_field("Priority", FieldKind::Integer)
                .with_search(sorted),
            TypeDefinition::new("Shop")
                .searchable()
                .with_partition(PartitionScope::Shared)
                .with_field("Name", FieldKind::Text),
        ])
        .expect("test registry is valid"),
    )
}

/// One row of the fake database.
#[derive(Debug, Clone)]
pub struct DbRow {
    pub type_name: String,
    pub id: u32,
    pub draft: BTreeMap<String, String>,
    pub live: Option<BTreeMap<String, String>>,
}

/// Rows plus the `primary_indexed` flag of each `(table, id)`.
#[derive(Debug, Default)]
pub struct FakeDatabase {
    rows: Mutex<Vec<DbRow>>,
    flags: Mutex<BTreeMap<(String, u32), bool>>,
    statements: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn rows(&self) -> Vec<DbRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn upsert(&self, row: DbRow) {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| !(r.type_name == row.type_name && r.id == row.id));
        rows.push(row);
    }

    pub fn flag(&self, table: &str, id: u32) -> bool {
        self.flags
            .lock()
            .unwrap()
            .get(&(table.to_string(), id))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_flag(&self, table: &str, id: u32, value: bool) {
        self.flags
            .lock()
            .unwrap()
            .insert((table.to_string(), id), value);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowSource for FakeDatabase {
    async fn execute(&self, statement: &str) -> CoreResult<()> {
        let clear = Regex::new(r"^UPDATE `(\w+)` SET `\w+`\.`primary_indexed` = 0 WHERE `\w+`\.`ID` = (\d+)$")
            .map_err(|e| CoreError::operation(e.to_string()))?;
        let captures = clear
            .captures(statement)
            .ok_or_else(|| CoreError::storage(format!("unsupported statement: {statement}")))?;
        let id: u32 = captures[2]
            .parse()
            .map_err(|e| CoreError::storage(format!("bad id: {e}")))?;
        self.set_flag(&captures[1], id, false);
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    async fn fetch(&self, _query: &str) -> CoreResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

/// Builds engine indexes from the fake database.
pub struct FakeIndexer {
    planner: Arc<IndexPlanner>,
    db: Arc<FakeDatabase>,
    engine: Arc<MemoryEngine>,
    pub rebuilds: Mutex<Vec<Vec<String>>>,
    pub dictionaries: Mutex<Vec<Vec<String>>>,
}

impl FakeIndexer {
    fn documents(&self, index: &IndexDescriptor) -> Vec<MemoryDocument> {
        let registry = self.planner.registry();
        let root = registry
            .base_type(&index.base_type)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| index.base_type.clone());
        let flag_table = index.source.flag_table.clone().unwrap_or_default();

        let mut documents = Vec::new();
        for row in self.db.rows() {
            if !index.contains_type(&row.type_name) {
                continue;
            }
            let fields = if index.staged {
                match &row.live {
                    Some(live) => live.clone(),
                    None => continue,
                }
            } else {
                row.draft.clone()
            };
            if index.delta {
                if self.db.flag(&flag_table, row.id) {
                    continue;
                }
            } else {
                self.db.set_flag(&flag_table, row.id, true);
            }

            let mut document = MemoryDocument::new(GlobalDocumentId::for_type(&root, row.id))
                .with_attribute(LOCAL_ID_ATTR, u64::from(row.id))
                .with_attribute(BASE_ID_ATTR, u64::from(partition_id(&root)))
                .with_attribute(CLASS_ID_ATTR, u64::from(partition_id(&row.type_name)))
                .with_attribute(DIRTY_ATTR, 0);
            for field in &index.fields {
                let value = fields.get(&field.name).map(String::as_str);
                match field.kind {
                    FieldKind::Text | FieldKind::EnumeratedText => {
                        if let Some(value) = value {
                            document = document.with_text(value);
                        }
                    }
                    FieldKind::Integer | FieldKind::Boolean => {
                        let number = value.and_then(|v| v.parse().ok()).unwrap_or(0);
                        document = document.with_attribute(&field.name, number);
                    }
                    _ => {}
                }
                if field.needs_packed_key() {
                    document = document.with_attribute(
                        packed_column(&field.name),
                        u64::from(packed_key(value.unwrap_or_default())),
                    );
                }
            }
            documents.push(document);
        }
        documents
    }
}

#[async_trait]
impl IndexBuilderBackend for FakeIndexer {
    async fn rebuild(&self, indexes: &[String]) -> CoreResult<String> {
        self.rebuilds.lock().unwrap().push(indexes.to_vec());
        let planned = self.planner.physical_indexes(None)?;
        let mut output = String::new();
        for name in indexes {
            match planned.iter().find(|index| index.name() == *name) {
                Some(index) => {
                    let documents = self.documents(index);
                    output.push_str(&format!(
                        "indexing index '{name}'...\ntotal {} docs\n",
                        documents.len()
                    ));
                    self.engine.load_index(name, documents)?;
                }
                None => output.push_str(&format!("ERROR: index '{name}': not found.\n")),
            }
        }
        Ok(output)
    }

    async fn rebuild_dictionary(&self, indexes: &[String]) -> CoreResult<()> {
        self.dictionaries.lock().unwrap().push(indexes.to_vec());
        Ok(())
    }
}

/// Word corrections from a fixed table.
pub struct Dictionary(pub BTreeMap<String, Vec<String>>);

impl Dictionary {
    pub fn new(entries: &[(&str, &[&str])]) -> Self {
        Self(
            entries
                .iter()
                .map(|(word, candidates)| {
                    (
                        word.to_string(),
                        candidates.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl SpellingSource for Dictionary {
    fn suggest(&self, word: &str, limit: usize) -> Vec<String> {
        self.0
            .get(word)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

/// Test harness for integration tests.
pub struct TestHarness {
    pub config: PolydexConfig,
    pub planner: Arc<IndexPlanner>,
    pub engine: Arc<MemoryEngine>,
    pub store: Arc<MemoryStore>,
    pub db: Arc<FakeDatabase>,
    pub indexer: Arc<FakeIndexer>,
    pub maintainer: IndexMaintainer,
}

impl TestHarness {
    /// Harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PolydexConfig::default())
    }

    /// Harness with a custom configuration and the standard variant pipeline.
    pub fn with_config(config: PolydexConfig) -> Self {
        let planner = Arc::new(IndexPlanner::new(registry(), &config));
        let engine = Arc::new(MemoryEngine::new());
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(FakeDatabase::default());
        let indexer = Arc::new(FakeIndexer {
            planner: Arc::clone(&planner),
            db: Arc::clone(&db),
            engine: Arc::clone(&engine),
            rebuilds: Mutex::new(Vec::new()),
            dictionaries: Mutex::new(Vec::new()),
        });
        let maintainer = IndexMaintainer::new(
            Arc::clone(&planner),
            engine.clone(),
            indexer.clone(),
        )
        .with_rows(db.clone());
        Self {
            config,
            planner,
            engine,
            store,
            db,
            indexer,
            maintainer,
        }
    }

    /// Coordinator over the harness engine and store.
    pub fn coordinator(&self) -> QueryCoordinator {
        QueryCoordinator::new(
            Arc::clone(&self.planner),
            self.engine.clone(),
            self.store.clone(),
            self.config.clone(),
        )
    }

    /// Store a draft row without touching any index. A published snapshot
    /// of the row is kept.
    pub fn seed(&self, type_name: &str, id: u32, fields: &[(&str, &str)]) {
        let fields: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.db.upsert(DbRow {
            type_name: type_name.to_string(),
            id,
            draft: fields.clone(),
            live: self.live(type_name, id),
        });
        self.store_record(type_name, id, &fields);
    }

    /// Copy a row's draft to its published snapshot.
    pub fn publish(&self, type_name: &str, id: u32) {
        if let Some(mut row) = self
            .db
            .rows()
            .into_iter()
            .find(|r| r.type_name == type_name && r.id == id)
        {
            row.live = Some(row.draft.clone());
            self.db.upsert(row);
        }
    }

    /// Write a row and let the maintainer track it.
    pub async fn write(
        &self,
        type_name: &str,
        id: u32,
        fields: &[(&str, &str)],
        batch: &mut RefreshBatch,
    ) {
        let live = self.live(type_name, id);
        let fields: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.db.upsert(DbRow {
            type_name: type_name.to_string(),
            id,
            draft: fields.clone(),
            live,
        });
        self.store_record(type_name, id, &fields);
        self.maintainer
            .mark_stale(type_name, id, batch)
            .await
            .expect("mark_stale succeeds");
    }

    /// Build every planned index.
    pub async fn refresh_all(&self) {
        let report = self
            .maintainer
            .refresh_indexes(None)
            .await
            .expect("refresh succeeds");
        assert!(!report.failed, "indexer output: {}", report.output);
    }

    fn live(&self, type_name: &str, id: u32) -> Option<BTreeMap<String, String>> {
        self.db
            .rows()
            .into_iter()
            .find(|r| r.type_name == type_name && r.id == id)
            .and_then(|r| r.live)
    }

    fn store_record(&self, type_name: &str, id: u32, fields: &BTreeMap<String, String>) {
        let mut record = Record::new(type_name, id);
        for (name, value) in fields {
            record = record.with_field(name, value);
        }
        self.store.insert(record).expect("store insert");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Harness seeded with a handful of articles and shops, fully indexed.
pub async fn seeded() -> TestHarness {
    let harness = TestHarness::new();
    harness.seed("Article", 1, &[("Title", "Rust ownership"), ("Rating", "5")]);
    harness.seed("NewsArticle", 2, &[("Title", "Rust release news"), ("Rating", "3")]);
    harness.seed(
        "SpecialArticle",
        3,
        &[("Title", "Special rust feature"), ("Rating", "4"), ("Priority", "1")],
    );
    harness.seed("Article", 4, &[("Title", "Gardening"), ("Rating", "2")]);
    harness.seed("Shop", 1, &[("Name", "Corner shop"), ("partition_id", "0")]);
    harness.seed("Shop", 2, &[("Name", "Harbour shop"), ("partition_id", "3")]);
    harness.seed("Shop", 3, &[("Name", "Market shop"), ("partition_id", "7")]);
    harness.refresh_all().await;
    harness
}

/// Local ids of a result, in order.
pub fn ids(result: &polydex_search::SearchResult) -> Vec<u32> {
    result.records().map(|r| r.id).collect()
}

/// Titles of a result, in order.
pub fn titles(result: &polydex_search::SearchResult) -> Vec<String> {
    result
        .records()
        .map(|r| r.field("Title").unwrap_or_default().to_string())
        .collect()
}
