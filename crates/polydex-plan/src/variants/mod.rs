//! Variant handlers.
//!
//! A variant is an orthogonal dimension that multiplies one planned index
//! into several physical ones and adjusts searches accordingly. Handlers are
//! registered explicitly in a [`VariantPipeline`] and each one only adds to
//! what the others produce, so their order does not change the outcome.
//!
//! ```text
//!             plan                         search
//!   ┌───────────────────────┐   ┌──────────────────────────────┐
//!   │ expand_fields(type)   │   │ expand_search(selection,     │
//!   │ expand_indexes(base)  │   │               options)       │
//!   └───────────┬───────────┘   └──────────────┬───────────────┘
//!               │                              │
//!     ┌─────────┼─────────┐         ┌──────────┼──────────┐
//!     ▼         ▼         ▼         ▼          ▼          ▼
//!   Delta    Staging  Partition   Delta     Staging   Partition
//! ```

pub mod delta;
pub mod partition;
pub mod staging;

use std::fmt;
use std::sync::Arc;

use polydex_core::{PolydexConfig, TypeRegistry};

use crate::fields::FieldDescriptor;
use crate::index::IndexDescriptor;
use crate::query::{IndexSelection, QueryOptions};

pub use delta::DeltaHandler;
pub use partition::PartitionHandler;
pub use staging::StagingHandler;

/// One variant dimension.
///
/// Every operation has a no-op default so handlers only implement the hooks
/// they need.
pub trait VariantHandler: Send + Sync {
    /// Short handler name, used in logs.
    fn name(&self) -> &str;

    /// Append physical indexes derived from the planned ones of `base_type`.
    fn expand_indexes(
        &self,
        _registry: &TypeRegistry,
        _base_type: &str,
        _indexes: &mut Vec<IndexDescriptor>,
    ) {
    }

    /// Adjust the physical index selection and options of a search.
    fn expand_search(
        &self,
        _registry: &TypeRegistry,
        _selection: &mut IndexSelection,
        _options: &mut QueryOptions,
    ) {
    }

    /// Append synthetic fields to a type's field list.
    fn expand_fields(
        &self,
        _registry: &TypeRegistry,
        _type_name: &str,
        _fields: &mut Vec<FieldDescriptor>,
    ) {
    }
}

/// Ordered list of variant handlers.
#[derive(Clone, Default)]
pub struct VariantPipeline {
    handlers: Vec<Arc<dyn VariantHandler>>,
}

impl fmt::Debug for VariantPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantPipeline")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

impl VariantPipeline {
    /// Pipeline without handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta, staging and partition handlers configured from `config`.
    pub fn standard(config: &PolydexConfig) -> Self {
        Self::new()
            .with(DeltaHandler)
            .with(StagingHandler::new(config.ambient_stage))
            .with(PartitionHandler::new(config.ambient_partition))
    }

    /// Register a handler.
    pub fn with(mut self, handler: impl VariantHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Registered handler names, in order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler's `expand_indexes`.
    pub fn expand_indexes(
        &self,
        registry: &TypeRegistry,
        base_type: &str,
        indexes: &mut Vec<IndexDescriptor>,
    ) {
        for handler in &self.handlers {
            handler.expand_indexes(registry, base_type, indexes);
        }
    }

    /// Run every handler's `expand_search`.
    pub fn expand_search(
        &self,
        registry: &TypeRegistry,
        selection: &mut IndexSelection,
        options: &mut QueryOptions,
    ) {
        for handler in &self.handlers {
            handler.expand_search(registry, selection, options);
        }
    }

    /// Run every handler's `expand_fields`.
    pub fn expand_fields(
        &self,
        registry: &TypeRegistry,
        type_name: &str,
        fields: &mut Vec<FieldDescriptor>,
    ) {
        for handler in &self.handlers {
            handler.expand_fields(registry, type_name, fields);
        }
    }
}
