//! Identity codec.
//!
//! The engine only understands opaque 64-bit document ids. Every indexed row
//! is identified by its base type's partition id in the high 32 bits and its
//! local row id in the low 32 bits. Partition ids are the CRC32 of the base
//! type name, so they are stable across processes and re-indexing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable 32-bit identifier of a type name (IEEE CRC32).
///
/// # Examples
///
/// ```
/// use polydex_core::util::ids::partition_id;
///
/// assert_eq!(partition_id("SiteTree"), 1468840814);
/// assert_eq!(partition_id("File"), 749574446);
/// ```
pub fn partition_id(type_name: &str) -> u32 {
    crc32fast::hash(type_name.as_bytes())
}

/// 64-bit global document identifier: `(partition << 32) | local_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalDocumentId(u64);

impl GlobalDocumentId {
    /// Combine a partition id and a local row id.
    ///
    /// # Examples
    ///
    /// ```
    /// use polydex_core::util::ids::GlobalDocumentId;
    ///
    /// let id = GlobalDocumentId::encode(3023971265, 42);
    /// assert_eq!(id.decode(), (3023971265, 42));
    /// ```
    pub const fn encode(partition: u32, local_id: u32) -> Self {
        Self(((partition as u64) << 32) | local_id as u64)
    }

    /// Encode a row of the named base type.
    pub fn for_type(base_type: &str, local_id: u32) -> Self {
        Self::encode(partition_id(base_type), local_id)
    }

    /// Wrap a raw engine id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Split into `(partition, local_id)`.
    pub const fn decode(self) -> (u32, u32) {
        (self.partition(), self.local_id())
    }

    /// Partition id (high 32 bits).
    pub const fn partition(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Local row id (low 32 bits).
    pub const fn local_id(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Raw 64-bit value as sent to the engine.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GlobalDocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalDocumentId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Fail when two distinct names hash to the same partition id.
///
/// Global ids are only unique while every base type owns a distinct
/// partition, so a clash is a configuration error.
pub fn check_collisions<'a, I>(names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: BTreeMap<u32, &str> = BTreeMap::new();
    for name in names {
        let id = partition_id(name);
        match seen.get(&id) {
            Some(existing) if *existing != name => {
                return Err(Error::config(format!(
                    "CRC32 clash between '{existing}' and '{name}' (partition id {id}); rename one of them"
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(id, name);
            }
        }
    }
    Ok(())
}

/// Inverse of [`partition_id`] over a known set of type names.
#[derive(Debug, Clone, Default)]
pub struct PartitionMap {
    names: BTreeMap<u32, String>,
}

impl PartitionMap {
    /// Build the map from type names.
    pub fn new<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names = names
            .into_iter()
            .map(|name| (partition_id(name), name.to_string()))
            .collect();
        Self { names }
    }

    /// Type name for a partition id, if known.
    pub fn resolve(&self, partition: u32) -> Option<&str> {
        self.names.get(&partition).map(String::as_str)
    }

    /// Number of known names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
