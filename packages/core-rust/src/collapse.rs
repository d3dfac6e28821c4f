//! Canonical single-item list form to collapsed form.
//!
//! Every check happens before the first key is touched, so a field that is
//! rejected is left exactly as it was.

use tracing::debug;

use crate::error::FixupError;
use crate::flatmap::{child_key, index_key, FlatAttributes};
use crate::schema::{CountMarker, FieldShape, SchemaNode};

/// Rewrites the AsSingle field at `path` from canonical to collapsed form.
///
/// Returns `Ok(true)` if any key changed. Left alone, with `Ok(false)`:
/// a field without a count key (absent or already collapsed), a count key in
/// the other spelling than `marker`, a count of 0, and a resource element
/// with no keys at all, since the collapsed form has no way to express an
/// empty element.
///
/// - Primitive list: `P.# = 1`, `P.0 = V` becomes `P = V`.
/// - Resource list: `P.# = 1` and each `P.0.rest = V` become `P.rest = V`.
pub(crate) fn collapse_field(
    attrs: &mut FlatAttributes,
    path: &str,
    node: &SchemaNode,
    marker: CountMarker,
) -> Result<bool, FixupError> {
    let Some(lookup) = attrs.count_at(path) else {
        return Ok(false);
    };
    if lookup.marker != marker {
        return Ok(false);
    }
    match lookup.parse()? {
        0 => return Ok(false),
        1 => {}
        count => {
            return Err(FixupError::CountExceedsMax {
                path: path.to_string(),
                count,
            })
        }
    }

    let element = index_key(path, 0);
    match &node.shape {
        FieldShape::PrimitiveList => {
            let Some(value) = attrs.remove(&element) else {
                return Err(FixupError::MissingElement {
                    path: path.to_string(),
                });
            };
            attrs.insert(path, value);
        }
        FieldShape::ResourceList { .. } => {
            let prefix_len = element.len() + 1;
            let moved: Vec<(String, String)> = attrs
                .entries_under(&element)
                .map(|(key, value)| (key[prefix_len..].to_string(), value.to_string()))
                .collect();
            if moved.is_empty() {
                return Ok(false);
            }
            for (rest, value) in moved {
                attrs.remove(&child_key(&element, &rest));
                attrs.insert(child_key(path, &rest), value);
            }
        }
        FieldShape::Primitive => return Ok(false),
    }

    attrs.remove(&lookup.key);
    debug!(path, direction = "out", "collapsed AsSingle field");
    Ok(true)
}
