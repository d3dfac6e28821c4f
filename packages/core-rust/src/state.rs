//! Owning state record for one resource instance.
//!
//! The fixup functions take the flat map by value and return a new one. The
//! record is where the rewritten map is substituted back.

use serde::{Deserialize, Serialize};

use crate::fixup::{fixup_in, fixup_out};
use crate::flatmap::FlatAttributes;
use crate::schema::Schema;

/// Persisted state of one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Provider-assigned identifier. Empty once the instance is destroyed.
    pub id: String,
    /// Flattened attributes, or `None` when the record carries no attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<FlatAttributes>,
}

impl InstanceState {
    #[must_use]
    pub fn new(id: impl Into<String>, attributes: Option<FlatAttributes>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Rewrites collapsed AsSingle fields to canonical form in place.
    pub fn fixup_as_single_in(&mut self, schema: &Schema) {
        self.attributes = fixup_in(self.attributes.take(), schema);
    }

    /// Rewrites canonical AsSingle fields to collapsed form in place.
    pub fn fixup_as_single_out(&mut self, schema: &Schema) {
        self.attributes = fixup_out(self.attributes.take(), schema);
    }

    /// Looks up one attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key)
    }
}
