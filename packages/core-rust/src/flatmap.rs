//! Flat attribute maps: nested state flattened to dotted string keys.
//!
//! A list at path `P` with `N` items is stored as a count key `P.#` (or the
//! legacy `P.%`) holding `N`, followed by entries `P.0` .. `P.{N-1}`. Nested
//! resource fields append `.name` to the element path, so `a.0.b` is field
//! `b` of the first element of list `a`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FixupError;
use crate::schema::CountMarker;

/// Dotted-key map holding one flattened attribute tree.
///
/// Backed by a `BTreeMap` so iteration, debug output and equality are
/// deterministic and prefix scans are range queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatAttributes(BTreeMap<String, String>);

impl FlatAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Finds the count key for the list at `path`, checking `#` before `%`.
    #[must_use]
    pub fn count_at(&self, path: &str) -> Option<CountLookup> {
        CountMarker::ALL.into_iter().find_map(|marker| {
            let key = count_key(path, marker);
            self.0.get(&key).map(|raw| CountLookup {
                raw: raw.clone(),
                key,
                marker,
            })
        })
    }

    /// Whether either count key exists for `path`.
    #[must_use]
    pub fn has_count(&self, path: &str) -> bool {
        CountMarker::ALL
            .into_iter()
            .any(|marker| self.0.contains_key(&count_key(path, marker)))
    }

    /// All `(key, value)` pairs whose key starts with `path.`, in key order.
    pub fn entries_under<'a>(&'a self, path: &str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let prefix = format!("{path}.");
        self.0
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for FlatAttributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for FlatAttributes {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A count key found in a flat map, before its value is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountLookup {
    /// Full key, e.g. `"a.0.b.#"`.
    pub key: String,
    /// Which spelling was found.
    pub marker: CountMarker,
    /// Stored value, unparsed.
    pub raw: String,
}

impl CountLookup {
    /// Parses the stored value as a non-negative decimal count.
    pub fn parse(&self) -> Result<usize, FixupError> {
        let invalid = || FixupError::InvalidCount {
            key: self.key.clone(),
            value: self.raw.clone(),
        };
        // `usize::from_str` also takes a leading `+`.
        if !is_index_segment(&self.raw) {
            return Err(invalid());
        }
        self.raw.parse().map_err(|_| invalid())
    }
}

/// `path.#` or `path.%`.
#[must_use]
pub fn count_key(path: &str, marker: CountMarker) -> String {
    child_key(path, marker.as_str())
}

/// Joins a child segment onto a path. An empty path is the root.
#[must_use]
pub fn child_key(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// `path.{index}`.
#[must_use]
pub fn index_key(path: &str, index: usize) -> String {
    format!("{path}.{index}")
}

/// Whether a key segment is a list index.
#[must_use]
pub fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
