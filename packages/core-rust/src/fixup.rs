//! AsSingle fixup entry points.
//!
//! Legacy consumers store a list capped at one item with the AsSingle flag
//! in collapsed form: a bare scalar for a primitive list, or unindexed child
//! keys for a resource list. Everything else works on the canonical form,
//! where every list has a count key and indexed entries.
//!
//! - [`fixup_in`] runs after a flat map is read from storage or received from
//!   a plugin, rewriting collapsed fields to canonical form.
//! - [`fixup_out`] runs before a flat map is handed to a legacy consumer,
//!   rewriting canonical single-item fields back to collapsed form.
//!
//! On any map consistent with the schema the two are inverses of each other
//! and each is idempotent.
//!
//! # Malformed input
//!
//! A field whose count key is not a non-negative integer, whose count is above
//! one, or whose single element is missing is skipped and left untouched,
//! along with anything nested under it. [`fixup_in`] and [`fixup_out`] log a
//! warning for each; [`Fixup`] with `strict_mode` turns them into errors.

use tracing::{debug, warn};

use crate::collapse::collapse_field;
use crate::error::FixupError;
use crate::expand::expand_field;
use crate::flatmap::FlatAttributes;
use crate::schema::Schema;
use crate::walker::{SchemaWalker, WalkOrder};

/// Rewrites collapsed AsSingle fields to canonical single-item lists.
///
/// `None` is returned unchanged.
///
/// # Examples
///
/// ```
/// use flatmap_core::{fixup_in, FlatAttributes, Schema, SchemaNode};
///
/// let schema = Schema::new().field("a", SchemaNode::primitive_list().max_items(1).as_single());
/// let attrs: FlatAttributes = [("a", "hello")].into_iter().collect();
///
/// let expected: FlatAttributes = [("a.#", "1"), ("a.0", "hello")].into_iter().collect();
/// assert_eq!(fixup_in(Some(attrs), &schema), Some(expected));
/// assert_eq!(fixup_in(None, &schema), None);
/// ```
#[must_use]
pub fn fixup_in(attrs: Option<FlatAttributes>, schema: &Schema) -> Option<FlatAttributes> {
    attrs.map(|attrs| Fixup::new(schema).expand_report(attrs).into_lenient())
}

/// Rewrites canonical single-item AsSingle lists to collapsed form.
///
/// `None` is returned unchanged.
///
/// # Examples
///
/// ```
/// use flatmap_core::{fixup_out, FlatAttributes, Schema, SchemaNode};
///
/// let block = SchemaNode::resource_list([("b", SchemaNode::primitive())]);
/// let schema = Schema::new().field("a", block.max_items(1).as_single());
/// let attrs: FlatAttributes = [("a.#", "1"), ("a.0.b", "hello")].into_iter().collect();
///
/// let expected: FlatAttributes = [("a.b", "hello")].into_iter().collect();
/// assert_eq!(fixup_out(Some(attrs), &schema), Some(expected));
/// ```
#[must_use]
pub fn fixup_out(attrs: Option<FlatAttributes>, schema: &Schema) -> Option<FlatAttributes> {
    attrs.map(|attrs| Fixup::new(schema).collapse_report(attrs).into_lenient())
}

/// Behavior of a [`Fixup`] on malformed input.
#[derive(Debug, Clone, Default)]
pub struct FixupConfig {
    /// Return the first problem as an error instead of logging and skipping.
    pub strict_mode: bool,
}

/// Which way a fixup rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Collapsed to canonical.
    In,
    /// Canonical to collapsed.
    Out,
}

/// Output of one fixup pass, before the malformed-input policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixupReport {
    /// The rewritten map. Skipped fields hold their input keys.
    pub attributes: FlatAttributes,
    /// Number of fields rewritten.
    pub rewritten: usize,
    /// Fields left untouched because they were malformed, in visit order.
    pub skipped: Vec<FixupError>,
}

impl FixupReport {
    fn new(attributes: FlatAttributes) -> Self {
        Self {
            attributes,
            rewritten: 0,
            skipped: Vec::new(),
        }
    }

    /// Logs every skipped field and returns the map.
    #[must_use]
    pub fn into_lenient(self) -> FlatAttributes {
        for err in &self.skipped {
            warn!(error = %err, "skipped malformed AsSingle field");
        }
        self.attributes
    }

    /// Returns the map, or the first skipped field as an error.
    pub fn into_strict(self) -> Result<FlatAttributes, FixupError> {
        match self.skipped.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.attributes),
        }
    }

    // A malformed list is reported once even when several fields sit under it.
    fn skip(&mut self, err: FixupError) {
        if !self.skipped.contains(&err) {
            self.skipped.push(err);
        }
    }

    fn skip_all(&mut self, errs: Vec<FixupError>) {
        for err in errs {
            self.skip(err);
        }
    }
}

/// AsSingle fixup bound to one schema.
#[derive(Debug, Clone)]
pub struct Fixup<'s> {
    schema: &'s Schema,
    config: FixupConfig,
}

impl<'s> Fixup<'s> {
    /// Lenient fixup for `schema`.
    #[must_use]
    pub fn new(schema: &'s Schema) -> Self {
        Self::with_config(schema, FixupConfig::default())
    }

    #[must_use]
    pub fn with_config(schema: &'s Schema, config: FixupConfig) -> Self {
        Self { schema, config }
    }

    #[must_use]
    pub fn config(&self) -> &FixupConfig {
        &self.config
    }

    /// Collapsed to canonical, applying the configured malformed-input policy.
    pub fn expand(&self, attrs: FlatAttributes) -> Result<FlatAttributes, FixupError> {
        self.finish(self.expand_report(attrs))
    }

    /// Canonical to collapsed, applying the configured malformed-input policy.
    pub fn collapse(&self, attrs: FlatAttributes) -> Result<FlatAttributes, FixupError> {
        self.finish(self.collapse_report(attrs))
    }

    /// Runs either direction.
    pub fn apply(&self, attrs: FlatAttributes, direction: Direction) -> Result<FlatAttributes, FixupError> {
        match direction {
            Direction::In => self.expand(attrs),
            Direction::Out => self.collapse(attrs),
        }
    }

    fn finish(&self, report: FixupReport) -> Result<FlatAttributes, FixupError> {
        if self.config.strict_mode {
            report.into_strict()
        } else {
            Ok(report.into_lenient())
        }
    }

    /// Expands outer fields before inner ones: once `a` is expanded its
    /// children live under `a.0`, where the next visits resolve them.
    #[must_use]
    pub fn expand_report(&self, attrs: FlatAttributes) -> FixupReport {
        let mut report = FixupReport::new(attrs);
        if !self.schema.has_as_single() {
            return report;
        }
        let marker = self.schema.count_marker;
        for visit in SchemaWalker::new(self.schema, WalkOrder::ParentFirst).as_single_fields() {
            let resolution = visit.resolve(&report.attributes);
            report.skip_all(resolution.skipped);
            for path in resolution.paths {
                if expand_field(&mut report.attributes, &path, visit.node, marker) {
                    report.rewritten += 1;
                }
            }
        }
        debug!(direction = "in", rewritten = report.rewritten, "AsSingle fixup done");
        report
    }

    /// Collapses inner fields before outer ones: children are addressed
    /// under `a.0` until `a` itself is collapsed.
    #[must_use]
    pub fn collapse_report(&self, attrs: FlatAttributes) -> FixupReport {
        let mut report = FixupReport::new(attrs);
        if !self.schema.has_as_single() {
            return report;
        }
        let marker = self.schema.count_marker;
        for visit in SchemaWalker::new(self.schema, WalkOrder::ChildrenFirst).as_single_fields() {
            let resolution = visit.resolve(&report.attributes);
            report.skip_all(resolution.skipped);
            for path in resolution.paths {
                match collapse_field(&mut report.attributes, &path, visit.node, marker) {
                    Ok(true) => report.rewritten += 1,
                    Ok(false) => {}
                    Err(err) => report.skip(err),
                }
            }
        }
        debug!(direction = "out", rewritten = report.rewritten, "AsSingle fixup done");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CountMarker, SchemaNode};

    fn attrs(pairs: &[(&str, &str)]) -> FlatAttributes {
        pairs.iter().copied().collect()
    }

    fn single_primitive() -> SchemaNode {
        SchemaNode::primitive_list().max_items(1).as_single()
    }

    fn single_block<const N: usize>(children: [(&str, SchemaNode); N]) -> SchemaNode {
        SchemaNode::resource_list(children).max_items(1).as_single()
    }

    /// Checks `collapsed` -> In -> `canonical` and `canonical` -> Out -> `collapsed`.
    fn assert_in_out(schema: &Schema, collapsed: &[(&str, &str)], canonical: &[(&str, &str)]) {
        assert_eq!(
            fixup_in(Some(attrs(collapsed)), schema),
            Some(attrs(canonical)),
            "In"
        );
        assert_eq!(
            fixup_out(Some(attrs(canonical)), schema),
            Some(attrs(collapsed)),
            "Out"
        );
    }

    // ---- Table cases: each pair must hold in both directions ----

    #[test]
    fn empty_map() {
        assert_in_out(&Schema::new(), &[], &[]);
    }

    #[test]
    fn none_passes_through() {
        let schema = Schema::new().field("a", single_primitive());
        assert_eq!(fixup_in(None, &schema), None);
        assert_eq!(fixup_out(None, &schema), None);
        assert_eq!(fixup_in(None, &Schema::new()), None);
    }

    #[test]
    fn simple_primitive() {
        let schema = Schema::new().field("a", SchemaNode::primitive());
        assert_in_out(&schema, &[("a", "a value")], &[("a", "a value")]);
    }

    #[test]
    fn plain_primitive_list_empty() {
        let schema = Schema::new().field("a", SchemaNode::primitive_list());
        assert_in_out(&schema, &[("a.%", "0")], &[("a.%", "0")]);
    }

    #[test]
    fn plain_primitive_list_single() {
        let schema = Schema::new().field("a", SchemaNode::primitive_list());
        assert_in_out(&schema, &[("a.%", "1"), ("a.0", "hello")], &[("a.%", "1"), ("a.0", "hello")]);
    }

    #[test]
    fn as_single_primitive_list() {
        let schema = Schema::new().field("a", single_primitive());
        assert_in_out(&schema, &[("a", "hello")], &[("a.#", "1"), ("a.0", "hello")]);
    }

    #[test]
    fn as_single_resource_list() {
        let schema = Schema::new().field("a", single_block([("b", SchemaNode::primitive())]));
        assert_in_out(&schema, &[("a.b", "hello")], &[("a.#", "1"), ("a.0.b", "hello")]);
    }

    #[test]
    fn as_single_resource_with_plain_nested_list() {
        let schema = Schema::new().field("a", single_block([("b", SchemaNode::primitive_list())]));
        assert_in_out(
            &schema,
            &[("a.b.#", "1"), ("a.b.0", "hello")],
            &[("a.#", "1"), ("a.0.b.#", "1"), ("a.0.b.0", "hello")],
        );
    }

    #[test]
    fn as_single_resource_with_nested_as_single_primitive() {
        let schema = Schema::new().field("a", single_block([("b", single_primitive())]));
        assert_in_out(
            &schema,
            &[("a.b", "hello")],
            &[("a.#", "1"), ("a.0.b.#", "1"), ("a.0.b.0", "hello")],
        );
    }

    #[test]
    fn as_single_resource_with_nested_as_single_resource() {
        let schema = Schema::new().field(
            "a",
            single_block([("b", single_block([("c", SchemaNode::primitive())]))]),
        );
        assert_in_out(
            &schema,
            &[("a.b.c", "hello")],
            &[("a.#", "1"), ("a.0.b.#", "1"), ("a.0.b.0.c", "hello")],
        );
    }

    #[test]
    fn three_levels_deep() {
        let schema = Schema::new().field(
            "a",
            single_block([("b", single_block([("c", single_primitive())]))]),
        );
        assert_in_out(
            &schema,
            &[("a.b.c", "hello")],
            &[("a.#", "1"), ("a.0.b.#", "1"), ("a.0.b.0.c.#", "1"), ("a.0.b.0.c.0", "hello")],
        );
    }

    #[test]
    fn as_single_inside_plain_resource_list() {
        let schema = Schema::new().field(
            "rules",
            SchemaNode::resource_list([("name", SchemaNode::primitive()), ("port", single_primitive())]),
        );
        assert_in_out(
            &schema,
            &[
                ("rules.#", "2"),
                ("rules.0.name", "http"),
                ("rules.0.port", "80"),
                ("rules.1.name", "https"),
                ("rules.1.port", "443"),
            ],
            &[
                ("rules.#", "2"),
                ("rules.0.name", "http"),
                ("rules.0.port.#", "1"),
                ("rules.0.port.0", "80"),
                ("rules.1.name", "https"),
                ("rules.1.port.#", "1"),
                ("rules.1.port.0", "443"),
            ],
        );
    }

    #[test]
    fn siblings_and_unrelated_keys_survive() {
        let schema = Schema::new()
            .field("a", single_primitive())
            .field("b", single_block([("x", SchemaNode::primitive())]))
            .field("id", SchemaNode::primitive());
        assert_in_out(
            &schema,
            &[("a", "1"), ("b.x", "2"), ("id", "i-123"), ("unknown", "kept")],
            &[
                ("a.#", "1"),
                ("a.0", "1"),
                ("b.#", "1"),
                ("b.0.x", "2"),
                ("id", "i-123"),
                ("unknown", "kept"),
            ],
        );
    }

    #[test]
    fn empty_as_single_field_keeps_zero_count() {
        let schema = Schema::new()
            .field("a", single_primitive())
            .field("b", single_block([("x", SchemaNode::primitive())]));
        assert_in_out(&schema, &[("a.#", "0"), ("b.#", "0")], &[("a.#", "0"), ("b.#", "0")]);
    }

    #[test]
    fn absent_as_single_fields_stay_absent() {
        let schema = Schema::new()
            .field("a", single_primitive())
            .field("b", single_block([("c", single_primitive())]))
            .field("id", SchemaNode::primitive());
        assert_in_out(&schema, &[("id", "x")], &[("id", "x")]);
    }

    // ---- Idempotence on already-converted input ----

    #[test]
    fn in_is_idempotent_on_canonical_input() {
        let schema = Schema::new().field(
            "a",
            single_block([("b", single_block([("c", SchemaNode::primitive())]))]),
        );
        let canonical = attrs(&[("a.#", "1"), ("a.0.b.#", "1"), ("a.0.b.0.c", "hello")]);
        assert_eq!(fixup_in(Some(canonical.clone()), &schema), Some(canonical));
    }

    #[test]
    fn out_is_idempotent_on_collapsed_input() {
        let schema = Schema::new().field(
            "a",
            single_block([("b", single_block([("c", SchemaNode::primitive())]))]),
        );
        let collapsed = attrs(&[("a.b.c", "hello")]);
        assert_eq!(fixup_out(Some(collapsed.clone()), &schema), Some(collapsed));
    }

    // ---- Count marker ----

    #[test]
    fn percent_marker_schema() {
        let schema = Schema::new()
            .count_marker(CountMarker::Percent)
            .field("a", single_primitive());
        assert_in_out(&schema, &[("a", "hello")], &[("a.%", "1"), ("a.0", "hello")]);
    }

    #[test]
    fn foreign_marker_is_left_canonical() {
        let schema = Schema::new().field("a", single_primitive());
        let legacy = attrs(&[("a.%", "1"), ("a.0", "hello")]);
        assert_eq!(fixup_out(Some(legacy.clone()), &schema), Some(legacy.clone()));
        assert_eq!(fixup_in(Some(legacy.clone()), &schema), Some(legacy));
    }

    // ---- Malformed input ----

    #[test]
    fn lenient_skips_malformed_field_only() {
        let schema = Schema::new()
            .field("a", single_primitive())
            .field("b", single_primitive());
        let input = attrs(&[("a.#", "2"), ("a.0", "x"), ("a.1", "y"), ("b.#", "1"), ("b.0", "z")]);
        assert_eq!(
            fixup_out(Some(input), &schema),
            Some(attrs(&[("a.#", "2"), ("a.0", "x"), ("a.1", "y"), ("b", "z")]))
        );
    }

    #[test]
    fn lenient_skips_fields_under_malformed_list() {
        let schema = Schema::new().field(
            "rules",
            SchemaNode::resource_list([("port", single_primitive())]),
        );
        let input = attrs(&[("rules.#", "x"), ("rules.0.port", "80")]);
        assert_eq!(fixup_in(Some(input.clone()), &schema), Some(input));
    }

    #[test]
    fn signed_count_is_malformed() {
        let schema = Schema::new().field("a", single_primitive());
        let input = attrs(&[("a.#", "+1"), ("a.0", "v")]);
        assert_eq!(fixup_out(Some(input.clone()), &schema), Some(input.clone()));

        let fixup = Fixup::with_config(&schema, FixupConfig { strict_mode: true });
        assert_eq!(
            fixup.collapse(input),
            Err(FixupError::InvalidCount {
                key: "a.#".to_string(),
                value: "+1".to_string()
            })
        );
    }

    #[test]
    fn strict_mode_reports_first_problem() {
        let schema = Schema::new()
            .field("a", single_primitive())
            .field("b", single_primitive());
        let fixup = Fixup::with_config(&schema, FixupConfig { strict_mode: true });
        let input = attrs(&[("a.#", "nope"), ("b.#", "3")]);
        assert_eq!(
            fixup.collapse(input),
            Err(FixupError::InvalidCount {
                key: "a.#".to_string(),
                value: "nope".to_string()
            })
        );
    }

    #[test]
    fn strict_mode_accepts_well_formed_input() {
        let schema = Schema::new().field("a", single_primitive());
        let fixup = Fixup::with_config(&schema, FixupConfig { strict_mode: true });
        assert!(fixup.config().strict_mode);
        assert_eq!(
            fixup.apply(attrs(&[("a", "v")]), Direction::In),
            Ok(attrs(&[("a.#", "1"), ("a.0", "v")]))
        );
        assert_eq!(
            fixup.apply(attrs(&[("a.#", "1"), ("a.0", "v")]), Direction::Out),
            Ok(attrs(&[("a", "v")]))
        );
    }

    #[test]
    fn report_counts_and_dedupes() {
        let schema = Schema::new().field(
            "rules",
            SchemaNode::resource_list([("p", single_primitive()), ("q", single_primitive())]),
        );
        let report = Fixup::new(&schema).expand_report(attrs(&[("rules.#", "?"), ("rules.0.p", "1")]));
        assert_eq!(report.rewritten, 0);
        assert_eq!(report.skipped.len(), 1);

        let report = Fixup::new(&schema).expand_report(attrs(&[
            ("rules.#", "1"),
            ("rules.0.p", "1"),
            ("rules.0.q", "2"),
        ]));
        assert_eq!(report.rewritten, 2);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn lenient_expand_never_errors() {
        let schema = Schema::new().field("a", single_primitive());
        let fixup = Fixup::new(&schema);
        let input = attrs(&[("a.#", "bad")]);
        assert_eq!(fixup.expand(input.clone()), Ok(input.clone()));
        assert_eq!(fixup.collapse(input.clone()), Ok(input));
    }
}
