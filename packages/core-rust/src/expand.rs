//! Collapsed form to canonical single-item list form.

use tracing::debug;

use crate::flatmap::{child_key, count_key, index_key, is_index_segment, FlatAttributes};
use crate::schema::{CountMarker, FieldShape, SchemaNode};

/// Rewrites the AsSingle field at `path` from collapsed to canonical form.
///
/// Returns `true` if any key changed. A field that already has a count key
/// (either spelling) is canonical and left alone, as is a field with no keys
/// at or under `path`.
///
/// - Primitive list: `P = V` becomes `P.# = 1`, `P.0 = V`.
/// - Resource list: every `P.rest = V` becomes `P.0.rest = V`, plus `P.# = 1`.
///   Keys whose first segment after `P.` is an index are not part of the
///   collapsed form and stay where they are.
pub(crate) fn expand_field(
    attrs: &mut FlatAttributes,
    path: &str,
    node: &SchemaNode,
    marker: CountMarker,
) -> bool {
    if attrs.has_count(path) {
        return false;
    }

    let element = index_key(path, 0);
    match &node.shape {
        FieldShape::PrimitiveList => {
            let Some(value) = attrs.remove(path) else {
                return false;
            };
            attrs.insert(element, value);
        }
        FieldShape::ResourceList { .. } => {
            let prefix_len = path.len() + 1;
            let moved: Vec<(String, String)> = attrs
                .entries_under(path)
                .filter(|(key, _)| {
                    let first = key[prefix_len..].split('.').next().unwrap_or_default();
                    !is_index_segment(first)
                })
                .map(|(key, value)| (key[prefix_len..].to_string(), value.to_string()))
                .collect();
            if moved.is_empty() {
                return false;
            }
            for (rest, value) in moved {
                attrs.remove(&child_key(path, &rest));
                attrs.insert(child_key(&element, &rest), value);
            }
        }
        FieldShape::Primitive => return false,
    }

    attrs.insert(count_key(path, marker), "1");
    debug!(path, direction = "in", "expanded AsSingle field");
    true
}
