//! Parser for the engine's bespoke offending-inputs text.
//!
//! Engine messages embed concrete inputs in a Python-repr-like tuple form,
//! e.g. `(1, 0)`, `('a,b', [1, 2])`, `(-3.5, None)`. This module recovers
//! typed scalars from that form with a purpose-built recursive descent:
//! depth tracking over `()[]{}`, single- and double-quoted string literals
//! with backslash escapes, and splitting only at top-level commas.
//!
//! Numbers keep their native type (int vs float), booleans and `None` map to
//! their JSON counterparts, quoted strings are unescaped, and anything else
//! (nested containers included) is preserved verbatim as a string.

use serde_json::{Number, Value};

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses an offending-inputs rendering into one value per argument, in
/// positional order.
pub fn parse_offending_inputs(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    let inner = strip_wrapping(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(inner)
        .iter()
        .map(|token| parse_scalar(token))
        .collect()
}

/// Splits `text` at commas that sit outside every bracket pair and string
/// literal. Empty trailing segments (Python's one-tuple comma) are dropped.
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}

/// Removes one wrapping `(...)` or `[...]` layer when it encloses the whole
/// text. `(1) + (2)` is left alone; `(1, 2)` is unwrapped.
fn strip_wrapping(text: &str) -> &str {
    for (open, close) in [('(', ')'), ('[', ']')] {
        if wraps(text, open, close) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// `true` when `text` starts with `open`, ends with `close`, and the opening
/// bracket's match is the final character.
fn wraps(text: &str, open: char, close: char) -> bool {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c == open => {}
        _ => return false,
    }
    if !text.ends_with(close) {
        return false;
    }
    let mut depth: i32 = 1;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in chars {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return idx == text.len() - close.len_utf8();
                }
            }
            _ => {}
        }
    }
    false
}

/// Parses one argument token into a typed scalar. Unrecognized tokens
/// (nested containers, exotic reprs) are preserved verbatim.
fn parse_scalar(token: &str) -> Value {
    match token {
        "None" => return Value::Null,
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Value::from(i);
    }
    // Reject alphabetic pseudo-floats ("nan", "inf") up front so they fall
    // through to the verbatim case the way the engine rendered them.
    if token.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(f) = token.parse::<f64>() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    if let Some(unquoted) = unquote(token) {
        return Value::String(unquoted);
    }
    Value::String(token.to_string())
}

/// Strips matching quotes and resolves backslash escapes. `None` when the
/// token is not a complete quoted literal.
fn unquote(token: &str) -> Option<String> {
    let mut chars = token.chars();
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    if token.len() < 2 || !token.ends_with(quote) {
        return None;
    }
    let inner = &token[quote.len_utf8()..token.len() - quote.len_utf8()];
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            out.push(match ch {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                '0' => '\0',
                other => other,
            });
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            // Unescaped quote before the end: not a single literal.
            return None;
        } else {
            out.push(ch);
        }
    }
    if escaped {
        return None;
    }
    Some(out)
}

// ── Rendering (the inverse, used by the in-process engine) ───────────────────

/// Renders concrete arguments in the tuple form the parser accepts.
pub(crate) fn render_input_tuple(args: &[Value]) -> String {
    let rendered: Vec<String> = args.iter().map(render_value).collect();
    if rendered.len() == 1 {
        format!("({},)", rendered[0])
    } else {
        format!("({})", rendered.join(", "))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if n.as_i64().is_none() {
                    // Keep a decimal point so the value re-parses as a float.
                    if f.fract() == 0.0 && f.is_finite() {
                        return format!("{f:.1}");
                    }
                    return f.to_string();
                }
            }
            n.to_string()
        }
        Value::String(s) => {
            let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
            format!("'{escaped}'")
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(_) => "None".to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── split_top_level ───────────────────────────────────────────────────────

    #[test]
    fn test_split_plain_scalars() {
        assert_eq!(split_top_level("1, 0"), vec!["1", "0"]);
    }

    #[test]
    fn test_split_respects_nested_brackets() {
        assert_eq!(
            split_top_level("(1, 2), [3, 4], {5: 6}"),
            vec!["(1, 2)", "[3, 4]", "{5: 6}"]
        );
    }

    #[test]
    fn test_split_respects_quoted_commas() {
        assert_eq!(split_top_level("'a,b', 2"), vec!["'a,b'", "2"]);
        assert_eq!(split_top_level("\"x, y\", 'z'"), vec!["\"x, y\"", "'z'"]);
    }

    #[test]
    fn test_split_respects_escaped_quote_inside_string() {
        assert_eq!(split_top_level(r"'it\'s, fine', 1"), vec![r"'it\'s, fine'", "1"]);
    }

    #[test]
    fn test_split_drops_trailing_one_tuple_comma() {
        assert_eq!(split_top_level("1,"), vec!["1"]);
    }

    // ── parse_offending_inputs ────────────────────────────────────────────────

    #[test]
    fn test_parse_int_tuple() {
        assert_eq!(parse_offending_inputs("(1, 0)"), vec![Value::from(1), Value::from(0)]);
    }

    #[test]
    fn test_parse_keeps_int_and_float_distinct() {
        let parsed = parse_offending_inputs("(2, 2.0)");
        assert_eq!(parsed[0], Value::from(2));
        assert_eq!(parsed[1], Value::from(2.0));
        assert!(parsed[0].is_i64());
        assert!(parsed[1].is_f64());
    }

    #[test]
    fn test_parse_negative_numbers() {
        assert_eq!(
            parse_offending_inputs("(-3, -2.5)"),
            vec![Value::from(-3), Value::from(-2.5)]
        );
    }

    #[test]
    fn test_parse_booleans_and_none() {
        assert_eq!(
            parse_offending_inputs("(True, False, None)"),
            vec![Value::Bool(true), Value::Bool(false), Value::Null]
        );
    }

    #[test]
    fn test_parse_quoted_strings_with_escapes() {
        assert_eq!(
            parse_offending_inputs(r"('a,b', 'it\'s')"),
            vec![Value::from("a,b"), Value::from("it's")]
        );
        assert_eq!(
            parse_offending_inputs(r#"("line\nbreak",)"#),
            vec![Value::from("line\nbreak")]
        );
    }

    #[test]
    fn test_parse_single_scalar_without_wrapping() {
        assert_eq!(parse_offending_inputs("42"), vec![Value::from(42)]);
    }

    #[test]
    fn test_parse_one_tuple() {
        assert_eq!(parse_offending_inputs("(0,)"), vec![Value::from(0)]);
    }

    #[test]
    fn test_parse_empty_tuple() {
        assert_eq!(parse_offending_inputs("()"), Vec::<Value>::new());
        assert_eq!(parse_offending_inputs("  "), Vec::<Value>::new());
    }

    #[test]
    fn test_nested_container_preserved_verbatim() {
        let parsed = parse_offending_inputs("([1, 2], 3)");
        assert_eq!(parsed[0], Value::from("[1, 2]"));
        assert_eq!(parsed[1], Value::from(3));
    }

    #[test]
    fn test_adjacent_groups_are_not_unwrapped() {
        // "(1) + (2)" wraps nothing as a whole; it stays one verbatim token.
        let parsed = parse_offending_inputs("(1) + (2)");
        assert_eq!(parsed, vec![Value::from("(1) + (2)")]);
    }

    #[test]
    fn test_pseudo_float_words_stay_verbatim() {
        assert_eq!(parse_offending_inputs("(nan, inf)"), vec![Value::from("nan"), Value::from("inf")]);
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_render_matches_parser_expectations() {
        let args = vec![Value::from(1), Value::from(0)];
        assert_eq!(render_input_tuple(&args), "(1, 0)");
        assert_eq!(parse_offending_inputs("(1, 0)"), args);
    }

    #[test]
    fn test_render_one_tuple_and_float() {
        assert_eq!(render_input_tuple(&[Value::from(2.0)]), "(2.0,)");
        assert_eq!(render_input_tuple(&[Value::from("a'b")]), r"('a\'b',)");
    }

    #[test]
    fn test_render_none_and_bools() {
        assert_eq!(
            render_input_tuple(&[Value::Null, Value::Bool(true)]),
            "(None, True)"
        );
    }
}
