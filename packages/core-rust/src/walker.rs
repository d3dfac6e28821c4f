//! Schema traversal for the AsSingle fixup.
//!
//! The walker visits schema addresses ([`FieldPath`]), not concrete flat keys.
//! A field nested inside lists lives at a different key for every element of
//! every enclosing list, and the element indices depend on the map's current
//! state. [`Visit::resolve`] turns an address into the concrete key paths
//! present in a map right now, so it must be called after the enclosing
//! lists have been rewritten by earlier visits.
//!
//! Two orders are provided, one per direction:
//!
//! - [`WalkOrder::ParentFirst`]: a field before its children. Expansion uses
//!   this because expanding `a` moves its children from `a.x` to `a.0.x`.
//! - [`WalkOrder::ChildrenFirst`]: children before their parent. Collapse
//!   uses this because children are addressed under `a.0` until `a` itself
//!   is collapsed.
//!
//! Siblings are always visited in name order.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::FixupError;
use crate::flatmap::{child_key, index_key, is_index_segment, FlatAttributes};
use crate::schema::{Schema, SchemaNode};

/// Address of a field in the schema tree: field names from the root,
/// without list indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The schema root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// This path extended by one field name.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Nesting depth; top-level fields have depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Traversal order of a [`SchemaWalker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Pre-order: a field is yielded before its descendants.
    ParentFirst,
    /// Post-order: all descendants are yielded before the field.
    ChildrenFirst,
}

/// One field reached by the walker.
#[derive(Debug, Clone)]
pub struct Visit<'a> {
    /// Schema address of the field.
    pub path: FieldPath,
    /// The field's declaration.
    pub node: &'a SchemaNode,
}

/// Concrete key paths for a [`Visit`], plus the lists that could not be
/// entered because their count key was malformed.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Concrete paths of the field, one per enclosing element, in key order.
    pub paths: Vec<String>,
    /// Problems with enclosing lists. Fields beneath those lists are not
    /// included in `paths`.
    pub skipped: Vec<FixupError>,
}

impl Visit<'_> {
    /// Resolves this field's address to the concrete paths under which it
    /// occurs in `attrs`.
    ///
    /// Every segment but the last names a resource list. A list contributes
    /// one element path per index that has at least one key and is below
    /// the list's count. A list without a count key contributes nothing,
    /// which is how absent and collapsed ancestors stop resolution.
    #[must_use]
    pub fn resolve(&self, attrs: &FlatAttributes) -> Resolution {
        let mut resolution = Resolution::default();
        let Some((last, ancestors)) = self.path.segments().split_last() else {
            return resolution;
        };

        let mut bases = vec![String::new()];
        for name in ancestors {
            let mut next = Vec::new();
            for base in &bases {
                let list = child_key(base, name);
                match element_indices(attrs, &list) {
                    Ok(indices) => next.extend(indices.into_iter().map(|i| index_key(&list, i))),
                    Err(err) => resolution.skipped.push(err),
                }
            }
            bases = next;
        }

        resolution.paths = bases.iter().map(|base| child_key(base, last)).collect();
        resolution
    }
}

/// Indices of the elements of the list at `path` that hold at least one key.
fn element_indices(attrs: &FlatAttributes, path: &str) -> Result<BTreeSet<usize>, FixupError> {
    let Some(lookup) = attrs.count_at(path) else {
        return Ok(BTreeSet::new());
    };
    let count = lookup.parse()?;
    let prefix_len = path.len() + 1;
    Ok(attrs
        .entries_under(path)
        .filter_map(|(key, _)| {
            let segment = key[prefix_len..].split('.').next()?;
            if !is_index_segment(segment) {
                return None;
            }
            segment.parse::<usize>().ok()
        })
        .filter(|&index| index < count)
        .collect())
}

struct Frame<'a> {
    path: FieldPath,
    node: &'a SchemaNode,
    expanded: bool,
}

/// Iterator over every field reachable from a set of schema fields.
///
/// Descends into resource-list children whether or not the list itself is
/// AsSingle, since a plain list may still contain AsSingle descendants.
pub struct SchemaWalker<'a> {
    order: WalkOrder,
    stack: Vec<Frame<'a>>,
}

impl<'a> SchemaWalker<'a> {
    /// Walks a whole schema from its root.
    #[must_use]
    pub fn new(schema: &'a Schema, order: WalkOrder) -> Self {
        Self::visit(&schema.fields, &FieldPath::root(), order)
    }

    /// Walks `fields` as if they were found at `prefix`.
    #[must_use]
    pub fn visit(fields: &'a BTreeMap<String, SchemaNode>, prefix: &FieldPath, order: WalkOrder) -> Self {
        let mut walker = Self {
            order,
            stack: Vec::new(),
        };
        walker.push_fields(fields, prefix);
        walker
    }

    /// Restricts the walk to AsSingle fields.
    pub fn as_single_fields(self) -> impl Iterator<Item = Visit<'a>> {
        self.filter(|visit| visit.node.as_single)
    }

    // Reversed so that popping yields siblings in name order.
    fn push_fields(&mut self, fields: &'a BTreeMap<String, SchemaNode>, parent: &FieldPath) {
        for (name, node) in fields.iter().rev() {
            self.stack.push(Frame {
                path: parent.child(name),
                node,
                expanded: false,
            });
        }
    }
}

impl<'a> Iterator for SchemaWalker<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.pop()?;
            let children = frame.node.children().filter(|c| !c.is_empty());

            match (self.order, children) {
                (WalkOrder::ParentFirst, Some(children)) => {
                    self.push_fields(children, &frame.path);
                    return Some(Visit {
                        path: frame.path,
                        node: frame.node,
                    });
                }
                (WalkOrder::ChildrenFirst, Some(children)) if !frame.expanded => {
                    let path = frame.path.clone();
                    self.stack.push(Frame {
                        expanded: true,
                        ..frame
                    });
                    self.push_fields(children, &path);
                }
                _ => {
                    return Some(Visit {
                        path: frame.path,
                        node: frame.node,
                    });
                }
            }
        }
    }
}
