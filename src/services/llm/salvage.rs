//! Repair and parse possibly-truncated JSON from model output.
//!
//! Streamed responses get cut off mid-string or mid-array when the output
//! budget runs out. This module either produces a decoded JSON tree or
//! fails with a malformed-JSON error; it never hands partial text onward.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::utils::{ExtractError, ExtractResult};

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Extract a JSON object from raw model output.
///
/// Attempts, in order: direct parse, trailing-comma removal, closing an
/// unterminated string by truncating to the last complete value, and a
/// depth-scan for the longest balanced prefix.
pub fn salvage_json(raw: &str) -> ExtractResult<Value> {
    let text = strip_code_fences(raw.trim());

    // Candidate bounds: first '{' through last '}'
    let start = text
        .find('{')
        .ok_or_else(|| ExtractError::Malformed("no JSON object in response".into()))?;
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    let candidate = if end > start { &text[start..end] } else { &text[start..] };

    // 1. Direct parse
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }

    // 2. Trailing commas before } or ]
    let without_commas = TRAILING_COMMA.replace_all(candidate, "$1");
    if let Ok(value) = serde_json::from_str::<Value>(&without_commas) {
        return Ok(value);
    }

    // 3. Output truncated by the token budget: cut back past any dangling
    //    string literal and close whatever brackets remain open
    if let Some(closed) = close_unbalanced(candidate) {
        if let Ok(value) = serde_json::from_str::<Value>(&closed) {
            return Ok(value);
        }
    }

    // 4. Longest prefix where every brace closes
    if let Some(prefix) = balanced_prefix(candidate) {
        if let Ok(value) = serde_json::from_str::<Value>(prefix) {
            return Ok(value);
        }
    }

    Err(ExtractError::Malformed(format!(
        "unsalvageable JSON (first 120 chars): {}",
        candidate.chars().take(120).collect::<String>()
    )))
}

/// Drop a surrounding markdown code fence, if any
fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // skip the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    match body.rfind("```") {
        Some(i) => &body[..i],
        None => body,
    }
}

/// Track string/escape state while walking JSON text
struct JsonScanner {
    in_string: bool,
    escaped: bool,
}

impl JsonScanner {
    fn new() -> Self {
        Self {
            in_string: false,
            escaped: false,
        }
    }

    /// Feed one char; returns true when the char is structural (outside
    /// any string literal)
    fn structural(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match c {
            '\\' if self.in_string => {
                self.escaped = true;
                false
            }
            '"' => {
                self.in_string = !self.in_string;
                false
            }
            _ => !self.in_string,
        }
    }
}

/// Handle output cut off by the token budget: if a string literal is left
/// dangling, truncate back to the last complete object/array, then append
/// the closing brackets the running depth still requires.
fn close_unbalanced(text: &str) -> Option<String> {
    let mut scanner = JsonScanner::new();
    for c in text.chars() {
        scanner.structural(c);
    }

    let mut fixed = if scanner.in_string {
        // cut just before the dangling string opened
        let last_quote = text.rfind('"')?;
        let cut = text[..last_quote]
            .rfind(|c| c == '}' || c == ']')
            .map(|i| i + 1)?;
        text[..cut].to_string()
    } else {
        text.to_string()
    };

    // a trailing comma left at the cut point would break the re-parse
    let trimmed_len = fixed.trim_end().len();
    fixed.truncate(trimmed_len);
    if fixed.ends_with(',') {
        fixed.pop();
    }

    // close brackets in reverse nesting order
    let mut stack = Vec::new();
    let mut scanner = JsonScanner::new();
    for c in fixed.chars() {
        if scanner.structural(c) {
            match c {
                '{' | '[' => stack.push(c),
                '}' | ']' => {
                    stack.pop();
                }
                _ => {}
            }
        }
    }
    if stack.is_empty() && fixed.len() == text.len() {
        // nothing to repair, re-parsing the same text is pointless
        return None;
    }
    while let Some(open) = stack.pop() {
        fixed.push(if open == '{' { '}' } else { ']' });
    }
    Some(fixed)
}

/// Longest prefix in which all braces are balanced, ignoring characters
/// inside strings and escape sequences
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut depth: i64 = 0;
    let mut last_balanced = 0;
    let mut scanner = JsonScanner::new();

    for (i, c) in text.char_indices() {
        if !scanner.structural(c) {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    last_balanced = i + c.len_utf8();
                }
            }
            _ => {}
        }
    }

    (last_balanced > 0).then(|| &text[..last_balanced])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_json() {
        let v = salvage_json(r#"{"tables": [{"id": "table_1"}]}"#).unwrap();
        assert_eq!(v["tables"][0]["id"], "table_1");
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(salvage_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn ignores_prose_around_the_object() {
        let raw = "Here is the extraction:\n{\"a\": 1}\nLet me know!";
        assert_eq!(salvage_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn removes_trailing_commas() {
        let raw = r#"{"rows": [1, 2, 3,], "n": 3,}"#;
        assert_eq!(salvage_json(raw).unwrap(), json!({"rows": [1, 2, 3], "n": 3}));
    }

    #[test]
    fn closes_output_truncated_mid_string() {
        // stream cut off inside the second table's title
        let raw = r#"{"tables": [{"id": "table_1", "rows": [{"label": "Summa", "values": [null, 5]}]}, {"id": "table_2", "title": "Kassaf"#;
        let v = salvage_json(raw).unwrap();
        let tables = v["tables"].as_array().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0]["id"], "table_1");
    }

    #[test]
    fn closes_dangling_string_containing_a_brace() {
        let raw = r#"{"tables": [{"id": "table_1"}], "summary": "ends with } mid"#;
        let v = salvage_json(raw).unwrap();
        assert_eq!(v["tables"][0]["id"], "table_1");
        assert!(v.get("summary").is_none());
    }

    #[test]
    fn recovers_longest_balanced_prefix() {
        // truncated between values, not inside a string
        let raw = r#"{"a": {"b": 1}} trailing garbage {"unclosed": ["#;
        assert_eq!(salvage_json(raw).unwrap(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let raw = r#"{"note": "uses { and } and \" freely", "x": [1]}"#;
        let v = salvage_json(raw).unwrap();
        assert_eq!(v["x"], json!([1]));
    }

    #[test]
    fn fails_on_hopeless_input() {
        assert!(salvage_json("no json here at all").is_err());
        assert!(salvage_json("{\"a\": ").is_err());
    }

    #[test]
    fn salvage_of_serialized_output_is_identity() {
        let original = salvage_json(r#"{"tables": [{"id": "table_1", "rows": [],}]}"#).unwrap();
        let reserialized = serde_json::to_string(&original).unwrap();
        assert_eq!(salvage_json(&reserialized).unwrap(), original);
    }
}
