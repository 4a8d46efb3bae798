//! Polydex Search: query coordination over planned physical indexes.
//!
//! # Modules
//!
//! - [`backend`]: The engine query protocol
//! - [`memory`]: In-process engine and record store
//! - [`record`]: Live records and the store that resolves them
//! - [`types`]: Search requests and results
//! - [`coordinator`]: Logical searches to engine calls and back
//! - [`refine`]: Exact ordering of string-sorted pages
//! - [`suggest`]: Spelling suggestions for losing queries
//! - [`maintenance`]: Stale-row marking and index rebuilds
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       polydex-search                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  QueryCoordinator ──► IndexPlanner (polydex-plan)            │
//! │     │  ├── SortRefiner       (≤ 2 tie-group probes)          │
//! │     │  └── SpellingSuggester (reruns with corrections)       │
//! │     ▼                                                        │
//! │  SearchEngine trait             RecordStore trait            │
//! │  ├── MemoryEngine               └── MemoryStore              │
//! │  └── (engine transports)                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  IndexMaintainer: mark_stale / refresh_indexes               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use polydex_search::{QueryCoordinator, SearchRequest, SortField};
//!
//! let coordinator = QueryCoordinator::new(planner, engine, store, config);
//! let request = SearchRequest::new(["SiteTree"], "annual report")
//!     .sort_by(vec![SortField::asc("Title")])
//!     .page(0, 20)
//!     .with_suggestions();
//! let result = coordinator.search(&request).await?;
//! println!("{} of {} matches", result.matches.len(), result.total);
//! ```

#![doc = include_str!("../README.md")]

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod maintenance;
pub mod memory;
pub mod record;
pub mod refine;
pub mod suggest;
pub mod types;

#[cfg(test)]
mod proptests;

pub use backend::{
    EngineFilter, EngineMatch, EngineQuery, EngineResponse, EngineSort, SearchEngine,
};
pub use coordinator::QueryCoordinator;
pub use error::{Error, Result};
pub use maintenance::{
    IndexBuilderBackend, IndexMaintainer, RefreshBatch, RefreshReport, detect_indexing_error,
};
pub use memory::{MemoryDocument, MemoryEngine, MemoryStore};
pub use record::{Record, RecordStore};
pub use refine::{SortKeyField, SortRefiner, TieGroup, TieProbe};
pub use suggest::{RerunSearch, SpellingSource, SpellingSuggester};
pub use types::{Hit, SearchRequest, SearchResult, SortField, SortSpec, Suggestion};
