//! Polydex Core: shared types, errors, configuration and the identity codec.
//!
//! This crate provides the foundational types used across all Polydex crates.
//! It has no internal Polydex dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`config`]: Operational configuration loaded from TOML
//! - [`registry`]: The immutable record type hierarchy
//! - [`util`]: Identity codec and packed sort keys

#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod registry;
pub mod util;

#[cfg(test)]
mod proptests;

// Re-export key types at crate root for convenience
pub use config::{FieldPolicy, PolydexConfig, Stage};
pub use error::{Error, Result};
pub use registry::{
    FieldKind, IndexMode, ManyManyRelation, PartitionScope, SearchSettings, TypeDefinition,
    TypeRegistry,
};

// Convenience re-exports from util
pub use util::ids::{GlobalDocumentId, PartitionMap, check_collisions, partition_id};
pub use util::packing::{packed_column, packed_key};
