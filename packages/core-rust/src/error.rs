//! Error types for schema construction and strict-mode fixup.

/// Errors raised while building or loading a [`Schema`](crate::Schema).
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("field name must not be empty (under `{parent}`)")]
    EmptyFieldName { parent: String },
    #[error("field name `{name}` must not contain `.`")]
    DottedFieldName { name: String },
    #[error("field name `{name}` collides with a list index or count key segment")]
    ReservedFieldName { name: String },
    #[error("field `{path}` is AsSingle but is not a list")]
    AsSingleOnPrimitive { path: String },
    #[error("field `{path}` is AsSingle but max_items is {max_items}, expected 1")]
    AsSingleMaxItems { path: String, max_items: usize },
    #[error("field `{path}` is a primitive and cannot carry max_items")]
    MaxItemsOnPrimitive { path: String },
    #[error("invalid schema description: {0}")]
    Json(#[from] serde_json::Error),
}

/// Malformed flat attributes detected by a strict-mode fixup.
///
/// Lenient mode never returns these; it logs and leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixupError {
    #[error("count marker `{key}` holds `{value}`, not a non-negative integer")]
    InvalidCount { key: String, value: String },
    #[error("AsSingle field `{path}` has {count} items, at most 1 allowed")]
    CountExceedsMax { path: String, count: usize },
    #[error("AsSingle field `{path}` has count 1 but no element keys")]
    MissingElement { path: String },
}
