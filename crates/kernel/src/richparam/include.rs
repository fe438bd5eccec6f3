//! Include directive resolution.
//!
//! On top of the plain rich parameter grammar, include strings carry dotted
//! paths. Two passes turn them into the directive a resource acts on:
//!
//! - every proper prefix of a requested path is materialized as an implicit
//!   include (`a.b.c` brings in `a` and `a.b`);
//! - a path that crosses a `recursive` whitelist entry is handed to that
//!   entry whole: the remainder of the element, modifiers included, is
//!   appended to the entry's own `include` modifier. The ancestors of the
//!   redirection point are not materialized.
//!
//! Names missing from the whitelist survive this stage; the resource drops
//! them when it applies the includes.

use super::parser::{Directive, merge_element, split_elements, split_field};
use super::whitelist::Whitelist;

/// Modifier under which redirected sub-includes are collected.
pub const INCLUDE_MODIFIER: &str = "include";

/// Resolve an include string against `whitelist`.
pub fn resolve_includes(input: &str, whitelist: &Whitelist) -> Directive {
    let mut requested = Directive::new();
    let mut implicit: Vec<&str> = Vec::new();

    for element in split_elements(input) {
        let (field, modifiers) = split_field(element);

        if let Some(prefix) = recursion_point(field, whitelist) {
            let suffix = &element[prefix.len() + 1..];
            requested
                .modifiers_mut(prefix)
                .entry(INCLUDE_MODIFIER.to_string())
                .or_default()
                .push(suffix.to_string());
            tracing::trace!(field, prefix, suffix, "redirected include");
            continue;
        }

        implicit.extend(implicit_ancestors(field));
        merge_element(&mut requested, field, modifiers);
    }

    for ancestor in implicit {
        requested.insert_if_absent(ancestor);
    }

    tracing::debug!(input, includes = requested.len(), "resolved includes");
    requested
}

/// Proper prefixes of a dotted name, shortest first.
pub fn implicit_ancestors(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('.').map(move |(index, _)| &name[..index])
}

/// The shortest proper prefix of `name` whitelisted as `recursive`.
pub fn recursion_point<'a>(name: &'a str, whitelist: &Whitelist) -> Option<&'a str> {
    implicit_ancestors(name).find(|prefix| whitelist.is_recursive(prefix))
}
