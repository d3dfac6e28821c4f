//! Schema model describing the shape of a flattened attribute tree.
//!
//! A [`Schema`] is a named set of top-level [`SchemaNode`]s. Every node has a
//! [`FieldShape`]: a primitive, a list of primitives, or a list of nested
//! resources that own their own named children. List shapes may carry the
//! AsSingle flag, which is only meaningful when the list is capped at exactly
//! one item.
//!
//! The schema also carries the [`CountMarker`] spelling used for list counts
//! in its canonical flat form, so the marker is a property of the format
//! version rather than something inferred from whatever keys are present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::flatmap::is_index_segment;

/// Suffix spelling of the count key that precedes a list's indexed entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMarker {
    /// `"#"`, the canonical list count marker.
    #[default]
    Hash,
    /// `"%"`, the legacy marker still found on older primitive lists.
    Percent,
}

impl CountMarker {
    /// Both spellings, in lookup priority order.
    pub const ALL: [CountMarker; 2] = [CountMarker::Hash, CountMarker::Percent];

    /// The key segment for this marker.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CountMarker::Hash => "#",
            CountMarker::Percent => "%",
        }
    }
}

/// Declared shape of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldShape {
    /// A scalar value stored directly at the field's path.
    Primitive,
    /// A list of scalars stored at `path.0`, `path.1`, ...
    PrimitiveList,
    /// A list of nested resources, each element owning the named children.
    ResourceList {
        /// Child fields of every list element.
        children: BTreeMap<String, SchemaNode>,
    },
}

/// One field's declared shape plus its list constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Primitive, primitive list, or resource list.
    #[serde(flatten)]
    pub shape: FieldShape,
    /// Upper bound on list length. 0 means unbounded.
    #[serde(default)]
    pub max_items: usize,
    /// Whether the single item of this list is stored in collapsed form by
    /// legacy consumers.
    #[serde(default)]
    pub as_single: bool,
}

impl SchemaNode {
    /// A plain scalar field.
    #[must_use]
    pub fn primitive() -> Self {
        Self::with_shape(FieldShape::Primitive)
    }

    /// An unbounded list of scalars.
    #[must_use]
    pub fn primitive_list() -> Self {
        Self::with_shape(FieldShape::PrimitiveList)
    }

    /// An unbounded list of nested resources with the given children.
    pub fn resource_list<I, K>(children: I) -> Self
    where
        I: IntoIterator<Item = (K, SchemaNode)>,
        K: Into<String>,
    {
        Self::with_shape(FieldShape::ResourceList {
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    fn with_shape(shape: FieldShape) -> Self {
        Self {
            shape,
            max_items: 0,
            as_single: false,
        }
    }

    /// Sets the maximum list length.
    #[must_use]
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Marks the field AsSingle. Only valid together with `max_items(1)`;
    /// checked by [`Schema::validate`].
    #[must_use]
    pub fn as_single(mut self) -> Self {
        self.as_single = true;
        self
    }

    /// Whether the field is list-shaped.
    #[must_use]
    pub fn is_list(&self) -> bool {
        !matches!(self.shape, FieldShape::Primitive)
    }

    /// Child fields, for resource lists only.
    #[must_use]
    pub fn children(&self) -> Option<&BTreeMap<String, SchemaNode>> {
        match &self.shape {
            FieldShape::ResourceList { children } => Some(children),
            FieldShape::Primitive | FieldShape::PrimitiveList => None,
        }
    }

    /// Checks this node and its descendants. `path` is the node's dotted
    /// schema path, used in error messages.
    pub fn validate(&self, path: &str) -> Result<(), SchemaError> {
        if !self.is_list() {
            if self.as_single {
                return Err(SchemaError::AsSingleOnPrimitive {
                    path: path.to_string(),
                });
            }
            if self.max_items != 0 {
                return Err(SchemaError::MaxItemsOnPrimitive {
                    path: path.to_string(),
                });
            }
        }
        if self.as_single && self.max_items != 1 {
            return Err(SchemaError::AsSingleMaxItems {
                path: path.to_string(),
                max_items: self.max_items,
            });
        }
        if let Some(children) = self.children() {
            validate_fields(children, path)?;
        }
        Ok(())
    }
}

/// Top-level schema for one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Count marker written for canonical lists.
    #[serde(default)]
    pub count_marker: CountMarker,
    /// Top-level fields by name.
    #[serde(default)]
    pub fields: BTreeMap<String, SchemaNode>,
}

impl Schema {
    /// Creates an empty schema using the `"#"` count marker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a top-level field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.fields.insert(name.into(), node);
        self
    }

    /// Sets the count marker spelling for canonical lists.
    #[must_use]
    pub fn count_marker(mut self, marker: CountMarker) -> Self {
        self.count_marker = marker;
        self
    }

    /// Looks up a top-level field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.get(name)
    }

    /// Whether any field, at any depth, is AsSingle.
    #[must_use]
    pub fn has_as_single(&self) -> bool {
        fn any(fields: &BTreeMap<String, SchemaNode>) -> bool {
            fields
                .values()
                .any(|n| n.as_single || n.children().is_some_and(any))
        }
        any(&self.fields)
    }

    /// Checks field names and the AsSingle invariant across the whole tree.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_fields(&self.fields, "")
    }

    /// Parses and validates a JSON schema description.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }
}

fn validate_fields(fields: &BTreeMap<String, SchemaNode>, parent: &str) -> Result<(), SchemaError> {
    for (name, node) in fields {
        if name.is_empty() {
            return Err(SchemaError::EmptyFieldName {
                parent: parent.to_string(),
            });
        }
        if name.contains('.') {
            return Err(SchemaError::DottedFieldName { name: name.clone() });
        }
        if is_index_segment(name) || CountMarker::ALL.iter().any(|m| m.as_str() == name) {
            return Err(SchemaError::ReservedFieldName { name: name.clone() });
        }
        let path = if parent.is_empty() {
            name.clone()
        } else {
            format!("{parent}.{name}")
        };
        node.validate(&path)?;
    }
    Ok(())
}
