//! Modifier language scanner.
//!
//! Parses the part of a field entry after the first `:`:
//!
//! ```text
//! name1(arg1|arg2):name2(arg3):name3
//! ```
//!
//! Arguments may themselves hold complete modifier expressions
//! (`mod(inner:deep(x|y)|z)`), so both passes count parenthesis depth and
//! only treat `:` and `|` as separators at depth zero. Malformed input never
//! fails; unbalanced parentheses shift the depth and the scan carries on.

use super::parser::Modifiers;

/// Parse a modifier string into modifier name → ordered arguments.
///
/// A modifier without parentheses maps to an empty argument list. When a
/// name repeats, it keeps its first position and takes the later arguments.
pub fn parse_modifiers(input: &str) -> Modifiers {
    let mut modifiers = Modifiers::new();
    let mut name = String::new();
    let mut arguments = String::new();
    let mut depth: isize = 0;

    for c in input.chars() {
        match c {
            '(' => {
                if depth != 0 {
                    arguments.push(c);
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth != 0 {
                    arguments.push(c);
                }
            }
            ':' if depth == 0 => {
                modifiers.insert(std::mem::take(&mut name), parse_arguments(&arguments));
                arguments.clear();
            }
            _ if depth != 0 => arguments.push(c),
            _ => name.push(c),
        }
    }

    if !name.is_empty() {
        modifiers.insert(name, parse_arguments(&arguments));
    }

    modifiers
}

/// Split an argument string on top-level `|`.
///
/// Parentheses are kept verbatim so a nested expression survives as one
/// argument. A trailing empty argument is dropped; interior empty arguments
/// are kept.
pub fn parse_arguments(input: &str) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut depth: isize = 0;

    for c in input.chars() {
        match c {
            '(' => {
                current.push(c);
                depth += 1;
            }
            ')' => {
                current.push(c);
                depth -= 1;
            }
            '|' if depth == 0 => arguments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        arguments.push(current);
    }

    arguments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_modifier_has_no_arguments() {
        let parsed = parse_modifiers("desc");
        assert_eq!(parsed.get("desc"), Some(&Vec::new()));
    }

    #[test]
    fn arguments_split_on_pipes() {
        let parsed = parse_modifiers("is(1|2|3)");
        assert_eq!(parsed["is"], args(&["1", "2", "3"]));
    }

    #[test]
    fn nested_expression_stays_one_argument() {
        let parsed = parse_modifiers("mod(inner(x|y)|z)");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["mod"], args(&["inner(x|y)", "z"]));
    }

    #[test]
    fn nested_modifier_colon_is_not_a_separator() {
        let parsed = parse_modifiers("mod(innerField1:innerMod1(a|b)|param2):mod2(param3)");
        let names: Vec<&String> = parsed.keys().collect();
        assert_eq!(names, vec!["mod", "mod2"]);
        assert_eq!(parsed["mod"], args(&["innerField1:innerMod1(a|b)", "param2"]));
        assert_eq!(parsed["mod2"], args(&["param3"]));
    }

    #[test]
    fn repeated_modifier_keeps_first_position_and_last_arguments() {
        let parsed = parse_modifiers("a(1):b:a(2)");
        let names: Vec<&String> = parsed.keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(parsed["a"], args(&["2"]));
    }

    #[test]
    fn unterminated_parenthesis_keeps_content() {
        let parsed = parse_modifiers("limit(5");
        assert_eq!(parsed["limit"], args(&["5"]));
    }

    #[test]
    fn stray_closing_parenthesis_is_tolerated() {
        let parsed = parse_modifiers("a)b");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["a"], args(&[")b"]));
    }

    #[test]
    fn empty_parentheses_yield_no_arguments() {
        assert!(parse_modifiers("is()")["is"].is_empty());
    }

    #[test]
    fn interior_empty_argument_is_kept_trailing_is_dropped() {
        assert_eq!(parse_arguments("a||b|"), args(&["a", "", "b"]));
    }

    #[test]
    fn same_input_same_order() {
        let input = "z(1):y(2):x(3)";
        let first: Vec<String> = parse_modifiers(input).keys().cloned().collect();
        let second: Vec<String> = parse_modifiers(input).keys().cloned().collect();
        assert_eq!(first, vec!["z", "y", "x"]);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_name_recorded_only_at_separator() {
        let parsed = parse_modifiers("::desc");
        assert!(parsed.contains_key(""));
        assert!(parsed.contains_key("desc"));
        assert!(parse_modifiers("(x)").is_empty());
    }
}
