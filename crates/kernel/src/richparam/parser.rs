//! Rich parameter parser.
//!
//! A rich parameter is one comma-separated tier of field entries, each either
//! a bare field name or `field:modifiers`:
//!
//! ```text
//! title:contains(rust|wasm),created:gt(2024-01-01),author
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::modifiers::parse_modifiers;

/// Modifier name → ordered argument list.
pub type Modifiers = IndexMap<String, Vec<String>>;

/// Field name → modifiers, in the order fields were first mentioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directive(IndexMap<String, Modifiers>);

impl Directive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Modifiers> {
        self.0.get(field)
    }

    /// Field names in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Modifiers> {
        self.0.iter()
    }

    /// Add `field` with no modifiers unless it is already present.
    pub fn insert_if_absent(&mut self, field: impl Into<String>) {
        self.0.entry(field.into()).or_default();
    }

    /// Merge `modifiers` into `field`. Modifiers already present win.
    pub fn merge(&mut self, field: impl Into<String>, modifiers: Modifiers) {
        let existing = self.0.entry(field.into()).or_default();
        for (name, arguments) in modifiers {
            existing.entry(name).or_insert(arguments);
        }
    }

    /// Modifiers of `field`, creating an empty entry when absent.
    pub fn modifiers_mut(&mut self, field: impl Into<String>) -> &mut Modifiers {
        self.0.entry(field.into()).or_default()
    }

    pub fn remove(&mut self, field: &str) -> Option<Modifiers> {
        self.0.shift_remove(field)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Modifiers) -> bool) {
        self.0.retain(|field, modifiers| keep(field, modifiers));
    }

    /// Drop fields that carry no modifiers at all.
    pub fn without_empty(mut self) -> Self {
        self.retain(|_, modifiers| !modifiers.is_empty());
        self
    }

    /// Append the fields of `other` that are not present yet.
    pub fn union(mut self, other: &Directive) -> Self {
        for (field, modifiers) in other.iter() {
            if !self.contains(field) {
                self.0.insert(field.clone(), modifiers.clone());
            }
        }
        self
    }
}

impl IntoIterator for Directive {
    type Item = (String, Modifiers);
    type IntoIter = indexmap::map::IntoIter<String, Modifiers>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Directive {
    type Item = (&'a String, &'a Modifiers);
    type IntoIter = indexmap::map::Iter<'a, String, Modifiers>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Modifiers)> for Directive {
    fn from_iter<I: IntoIterator<Item = (String, Modifiers)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a complete rich parameter.
///
/// Empty input yields an empty directive. A field declared twice is merged
/// into its first occurrence, first-declared modifiers winning.
pub fn parse_rich_param(input: &str) -> Directive {
    let mut directive = Directive::new();
    for element in split_elements(input) {
        let (field, modifiers) = split_field(element);
        merge_element(&mut directive, field, modifiers);
    }
    tracing::trace!(input, fields = directive.len(), "parsed rich param");
    directive
}

pub(crate) fn split_elements(input: &str) -> impl Iterator<Item = &str> {
    let input = if input.is_empty() { None } else { Some(input) };
    input.into_iter().flat_map(|s| s.split(','))
}

pub(crate) fn split_field(element: &str) -> (&str, Option<&str>) {
    match element.split_once(':') {
        Some((field, modifiers)) => (field, Some(modifiers)),
        None => (element, None),
    }
}

pub(crate) fn merge_element(directive: &mut Directive, field: &str, modifiers: Option<&str>) {
    match modifiers {
        None => directive.insert_if_absent(field),
        Some(modifiers) => directive.merge(field, parse_modifiers(modifiers)),
    }
}
