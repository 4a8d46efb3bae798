//! Physical index descriptors.
//!
//! A planned index starts as a primary index named after its chosen base
//! type. Variant handlers derive staged copies and delta twins from it; the
//! physical name is always composed in the same order (`<Base>[Live][Delta]`)
//! so the result does not depend on which handler ran first.

use std::fmt;

use polydex_core::IndexMode;
use serde::{Deserialize, Serialize};

use crate::fields::FieldDescriptor;
use crate::signature::Signature;
use crate::source::DataSource;

/// Suffix of indexes built from the published snapshot.
pub const STAGED_SUFFIX: &str = "Live";
/// Suffix of delta twins.
pub const DELTA_SUFFIX: &str = "Delta";

/// Compose a physical index name.
pub fn physical_name(base: &str, staged: bool, delta: bool) -> String {
    let mut name = base.to_string();
    if staged {
        name.push_str(STAGED_SUFFIX);
    }
    if delta {
        name.push_str(DELTA_SUFFIX);
    }
    name
}

/// What a physical index was derived as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// The planned index itself.
    Primary,
    /// Rows flagged stale since the last primary refresh.
    DeltaOfPrimary,
    /// The primary index built from the published snapshot.
    StagedCopy,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VariantKind::Primary => "primary",
            VariantKind::DeltaOfPrimary => "delta",
            VariantKind::StagedCopy => "staged",
        };
        f.write_str(text)
    }
}

/// One physical index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Chosen base type naming the index.
    pub base_type: String,
    /// Concrete types whose rows the index holds, in declaration order.
    pub member_types: Vec<String>,
    /// Field schema of the chosen base.
    pub fields: Vec<FieldDescriptor>,
    /// How rows reach the engine.
    pub mode: IndexMode,
    /// Signature shared by every member.
    pub signature: Signature,
    /// Row source.
    pub source: DataSource,
    /// Built from the published snapshot.
    pub staged: bool,
    /// Delta twin of a primary index.
    pub delta: bool,
}

impl IndexDescriptor {
    /// Physical index name.
    pub fn name(&self) -> String {
        physical_name(&self.base_type, self.staged, self.delta)
    }

    /// Name of the engine source block feeding this index.
    pub fn source_name(&self) -> String {
        format!("{}Src", self.name())
    }

    /// Variant tag.
    pub fn kind(&self) -> VariantKind {
        if self.delta {
            VariantKind::DeltaOfPrimary
        } else if self.staged {
            VariantKind::StagedCopy
        } else {
            VariantKind::Primary
        }
    }

    /// Name of the index this one was derived from, `None` for a primary.
    pub fn derived_from(&self) -> Option<String> {
        match self.kind() {
            VariantKind::Primary => None,
            VariantKind::StagedCopy => Some(physical_name(&self.base_type, false, false)),
            VariantKind::DeltaOfPrimary => {
                Some(physical_name(&self.base_type, self.staged, false))
            }
        }
    }

    /// Whether the index holds rows of the given concrete type.
    pub fn contains_type(&self, type_name: &str) -> bool {
        self.member_types.iter().any(|t| t == type_name)
    }
}
