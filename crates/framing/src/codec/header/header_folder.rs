//! Folds a raw header list, as received off the wire, into a header map.
//!
//! Two views are offered:
//!
//! - [`HeaderFolder::fold`] applies the per-field rules of [`FieldClass`]:
//!   first wins, `", "` joining, `"; "` joining, or a list for `Set-Cookie`.
//! - [`HeaderFolder::fold_distinct`] keeps every raw value of every field, keyed
//!   by the lower-cased name, for callers that need exact duplicate fidelity.
//!
//! Folding is a pure function of the raw list: folding the same list twice
//! yields equal maps.

use indexmap::IndexMap;

use crate::codec::header::field_class::{self, FieldClass};

/// Ordered `(name, value)` pairs exactly as received. Not unique.
pub type RawHeaderList = Vec<(String, String)>;

/// A folded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    /// Only produced for [`FieldClass::Array`] fields.
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::Single(_) => None,
            FieldValue::List(values) => Some(values),
        }
    }
}

/// Header map produced by [`HeaderFolder::fold`].
///
/// Known fields are keyed by their lower-cased name, unknown fields by the
/// casing of their first occurrence. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedHeaders {
    entries: IndexMap<String, FieldValue>,
}

impl FoldedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.position(name).and_then(|index| self.entries.get_index(index)).map(|(_, value)| value)
    }

    /// The value of `name` if it folded to a single string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Inserts or replaces a value, keeping the key as given.
    pub fn insert<K: Into<String>>(&mut self, name: K, value: FieldValue) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => {
                if let Some((_, slot)) = self.entries.get_index_mut(index) {
                    *slot = value;
                }
            }
            None => {
                self.entries.insert(name, value);
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .get_index_of(name)
            .or_else(|| self.entries.keys().position(|key| key.eq_ignore_ascii_case(name)))
    }

    /// Applies one raw line to the map.
    pub fn add_line(&mut self, name: &str, value: &str) {
        let known = field_class::lookup(name);
        let class = known.map_or(FieldClass::Unknown, |field| field.class);
        let key = known.map_or(name, |field| field.key);

        match class {
            FieldClass::CommaJoined | FieldClass::SemicolonJoined => {
                let separator = if class == FieldClass::CommaJoined { ", " } else { "; " };
                match self.position(key).and_then(|index| self.entries.get_index_mut(index)) {
                    Some((_, FieldValue::Single(existing))) => {
                        existing.push_str(separator);
                        existing.push_str(value);
                    }
                    Some((_, slot)) => *slot = FieldValue::Single(value.to_owned()),
                    None => {
                        self.entries.insert(key.to_owned(), FieldValue::Single(value.to_owned()));
                    }
                }
            }
            FieldClass::Array => match self.position(key).and_then(|index| self.entries.get_index_mut(index)) {
                Some((_, FieldValue::List(values))) => values.push(value.to_owned()),
                Some((_, slot)) => *slot = FieldValue::List(vec![value.to_owned()]),
                None => {
                    self.entries.insert(key.to_owned(), FieldValue::List(vec![value.to_owned()]));
                }
            },
            FieldClass::NoDuplicates | FieldClass::Unknown => {
                // drop duplicates
                if !self.contains(key) {
                    self.entries.insert(key.to_owned(), FieldValue::Single(value.to_owned()));
                }
            }
        }
    }
}

/// Every raw value of every field, keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinctHeaders {
    entries: IndexMap<String, Vec<String>>,
}

impl DistinctHeaders {
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name.to_ascii_lowercase().as_str()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn add_line(&mut self, name: &str, value: &str) {
        self.entries.entry(name.to_ascii_lowercase()).or_default().push(value.to_owned());
    }
}

/// Stateless folding entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderFolder;

impl HeaderFolder {
    pub fn fold<N: AsRef<str>, V: AsRef<str>>(raw: &[(N, V)]) -> FoldedHeaders {
        let mut folded = FoldedHeaders::new();
        for (name, value) in raw {
            folded.add_line(name.as_ref(), value.as_ref());
        }
        folded
    }

    pub fn fold_distinct<N: AsRef<str>, V: AsRef<str>>(raw: &[(N, V)]) -> DistinctHeaders {
        let mut distinct = DistinctHeaders::default();
        for (name, value) in raw {
            distinct.add_line(name.as_ref(), value.as_ref());
        }
        distinct
    }
}
