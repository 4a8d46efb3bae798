//! Polydex Plan: from a record type hierarchy to physical search indexes.
//!
//! # Modules
//!
//! - [`fields`]: Field descriptors introspected from the type registry
//! - [`signature`]: Index-sharing signatures
//! - [`source`]: Structured row sources of physical indexes
//! - [`index`]: Physical index descriptors and variant naming
//! - [`query`]: Index selection and options adjusted at search time
//! - [`variants`]: Delta, staging and partition handlers
//! - [`planner`]: Signature grouping and the descriptor cache
//! - [`artifact`]: Engine configuration rendering and parsing
//! - [`feed`]: External document feeds for feed-mode indexes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        polydex-plan                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  FieldIntrospector ──► SignatureBuilder ──► IndexPlanner     │
//! │                                                 │            │
//! │                                       VariantPipeline        │
//! │                                   (delta, staging, partition)│
//! ├──────────────────────────────────────────────────────────────┤
//! │  IndexDescriptor + DataSource ──► artifact / feed            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![doc = include_str!("../README.md")]

pub mod artifact;
pub mod feed;
pub mod fields;
pub mod index;
pub mod planner;
pub mod query;
pub mod signature;
pub mod source;
pub mod variants;

#[cfg(test)]
mod proptests;

pub use artifact::{ArtifactBlock, IndexSummary, parse_artifact, render_artifact};
pub use feed::{ContentProvider, FeedBuilder, Row, RowSource};
pub use fields::{CLASS_NAME_FIELD, FieldDescriptor, FieldIntrospector, PRIMARY_INDEXED_FIELD};
pub use index::{IndexDescriptor, VariantKind, physical_name};
pub use planner::IndexPlanner;
pub use query::{FilterValue, IndexSelection, PartitionChoice, QueryOptions, SelectedIndex};
pub use signature::{Signature, SignatureBuilder};
pub use source::{
    AttrType, BASE_ID_ATTR, CLASS_ID_ATTR, DIRTY_ATTR, DataSource, ID_COLUMN, LOCAL_ID_ATTR,
    PARTITION_COLUMN,
};
pub use variants::{
    DeltaHandler, PartitionHandler, StagingHandler, VariantHandler, VariantPipeline,
};
