//! Index-sharing signatures.
//!
//! Two types with equal signatures can share one physical index. The
//! signature names the declared base (the most ancestral type carrying the
//! searchable extension) followed by every field, sorted by name, with its
//! filterable and sortable flags:
//!
//! ```text
//! :Article:class_name_10:title_11:
//! ```

use std::fmt;
use std::sync::Arc;

use polydex_core::TypeRegistry;
use serde::{Deserialize, Serialize};

use crate::fields::{FieldDescriptor, FieldIntrospector};

/// Canonical signature string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Signature text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes signatures from introspected fields.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    introspector: FieldIntrospector,
}

impl SignatureBuilder {
    /// Create a builder on top of an introspector.
    pub fn new(introspector: FieldIntrospector) -> Self {
        Self { introspector }
    }

    /// Signature of a type, introspecting its fields.
    pub fn signature(&self, type_name: &str) -> Signature {
        let fields = self.introspector.fields(type_name);
        self.signature_with_fields(type_name, &fields)
    }

    /// Signature of a type from an already computed field list.
    pub fn signature_with_fields(&self, type_name: &str, fields: &[FieldDescriptor]) -> Signature {
        canonical(self.introspector.registry(), type_name, fields)
    }
}

fn canonical(registry: &Arc<TypeRegistry>, type_name: &str, fields: &[FieldDescriptor]) -> Signature {
    let base = registry
        .declared_base(type_name)
        .map(|def| def.name.as_str())
        .unwrap_or_default();

    let mut sorted: Vec<&FieldDescriptor> = fields.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut text = format!(":{base}:");
    for field in sorted {
        text.push_str(&field.name);
        text.push('_');
        text.push(if field.filterable { '1' } else { '0' });
        text.push(if field.sortable { '1' } else { '0' });
        text.push(':');
    }
    Signature(text)
}
