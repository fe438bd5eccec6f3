#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Request language integration tests.
//!
//! Parsing of modifier strings and rich parameters, and include resolution
//! against whitelists.

use serde_json::json;
use setaccio_kernel::richparam::{
    Directive, IncludeStrategy, Whitelist, WhitelistEntry, parse_arguments, parse_modifiers,
    parse_rich_param, resolve_includes,
};
use setaccio_test_utils::assert;

fn as_json(directive: &Directive) -> serde_json::Value {
    serde_json::to_value(directive).unwrap()
}

// -------------------------------------------------------------------------
// Modifier language
// -------------------------------------------------------------------------

#[test]
fn nested_modifier_expression_is_one_argument() {
    let modifiers = parse_modifiers("mod(inner(x|y)|z)");
    assert_eq!(modifiers["mod"], vec!["inner(x|y)", "z"]);
    assert_eq!(modifiers.len(), 1);
}

#[test]
fn bare_modifier_has_empty_argument_list() {
    let modifiers = parse_modifiers("desc:limit(3)");
    assert!(modifiers["desc"].is_empty());
    assert_eq!(modifiers["limit"], vec!["3"]);
    let order: Vec<&String> = modifiers.keys().collect();
    assert_eq!(order, vec!["desc", "limit"]);
}

#[test]
fn unterminated_parenthesis_is_tolerated() {
    let modifiers = parse_modifiers("filter(a:is(1)");
    assert!(modifiers.contains_key("filter"));
    assert_eq!(parse_arguments("a|b(c|d"), vec!["a", "b(c|d"]);
}

#[test]
fn parsing_is_deterministic() {
    let input = "filter(a:is(1|2)|b:true):include(owner.tags):limit(5)";
    assert_eq!(parse_modifiers(input), parse_modifiers(input));
}

// -------------------------------------------------------------------------
// Rich parameters
// -------------------------------------------------------------------------

#[test]
fn duplicate_fields_merge_first_modifier_wins() {
    assert_eq!(
        as_json(&parse_rich_param("f:mod(a),f:mod2(b)")),
        json!({"f": {"mod": ["a"], "mod2": ["b"]}})
    );
    assert_eq!(
        as_json(&parse_rich_param("f:mod(a),f:mod(b)")),
        json!({"f": {"mod": ["a"]}})
    );
}

#[test]
fn fields_keep_first_mention_order() {
    let directive = parse_rich_param("b,a:desc,b:limit(2)");
    assert_eq!(directive.fields().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(directive.get("b").unwrap()["limit"], vec!["2"]);
    assert!(directive.get("a").unwrap()["desc"].is_empty());
}

#[test]
fn empty_input_is_empty_directive() {
    assert!(parse_rich_param("").is_empty());
    assert!(parse_rich_param("a:").get("a").unwrap().is_empty());
}

// -------------------------------------------------------------------------
// Include resolution
// -------------------------------------------------------------------------

#[test]
fn direct_ancestors_are_materialized() {
    let whitelist = Whitelist::new().direct("a").direct("a.b").direct("a.b.c");
    let resolved = resolve_includes("a.b.c", &whitelist);
    for name in ["a", "a.b", "a.b.c"] {
        assert!(resolved.contains(name), "missing {name}");
    }
}

#[test]
fn recursive_prefix_redirects_the_rest() {
    let whitelist = Whitelist::new().recursive("a");
    let resolved = resolve_includes("a.b.c", &whitelist);
    assert_eq!(as_json(&resolved), json!({"a": {"include": ["b.c"]}}));
    assert!(!resolved.contains("a.b"));
    assert!(!resolved.contains("a.b.c"));
}

#[test]
fn tags_color_end_to_end() {
    let whitelist: Whitelist =
        serde_json::from_value(json!({"id": "direct", "tags": "recursive"})).unwrap();
    assert_eq!(whitelist.strategy("tags"), Some(IncludeStrategy::Recursive));

    let resolved = resolve_includes("tags.color", &whitelist);
    assert::json_eq(&as_json(&resolved), &json!({"tags": {"include": ["color"]}}));
}

#[test]
fn descriptor_whitelist_entries() {
    let whitelist: Whitelist = serde_json::from_value(json!({
        "owner": {"strategy": "recursive", "model": "User"},
        "title": {"strategy": "direct", "translatable": true},
        "legacy": 1
    }))
    .unwrap();
    assert!(whitelist.is_recursive("owner"));
    assert!(whitelist.is_recursive("legacy"));
    assert_eq!(whitelist.get("owner").unwrap().model.as_deref(), Some("User"));
    assert_eq!(whitelist.translatable_fields(), vec!["title"]);
}

#[test]
fn composed_whitelist_prefers_own_entries() {
    let own = Whitelist::new().with("owner", WhitelistEntry::direct());
    let base = Whitelist::new().recursive("owner").direct("created");
    let composed = Whitelist::compose(&own, &[&base]);
    assert!(!composed.is_recursive("owner"));
    assert!(composed.contains("created"));
    assert_eq!(composed.fields().collect::<Vec<_>>(), vec!["owner", "created"]);
}
