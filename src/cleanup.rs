//! Deterministic repair of raw model output before structural parsing.
//!
//! `clean` is a pure function of its inputs: no network access, no shared
//! state. Accumulated cleanup rules run first, in stored order, then the
//! built-in repairs (code-fence stripping, JSON-span trimming, trailing-comma
//! collapse). If nothing brace-delimited can be found the rule-cleaned text
//! is returned unchanged and the downstream JSON parse reports the failure.

use regex::Regex;

use crate::types::CleanupRule;

/// Clean raw model output into a candidate JSON string.
pub fn clean(raw_text: &str, rules: &[CleanupRule]) -> String {
    let mut text = raw_text.trim().to_string();

    for rule in rules {
        if rule.regex {
            // Invalid patterns are skipped rather than failing the cleanup.
            if let Ok(re) = Regex::new(&rule.pattern) {
                text = re.replace_all(&text, rule.replacement.as_str()).into_owned();
            }
        } else {
            text = text.replace(&rule.pattern, &rule.replacement);
        }
    }

    let text = strip_code_fences(text.trim());
    let text = trim_to_json_span(text);
    collapse_trailing_commas(&text)
}

/// Strip surrounding markdown code-fence markers if present.
fn strip_code_fences(text: &str) -> &str {
    let mut text = text;
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Trim to the outermost `{...}` or `[...]` span when prose surrounds the
/// JSON. Returns the input unchanged when no such span exists.
fn trim_to_json_span(text: &str) -> String {
    let opener = text.char_indices().find(|(_, c)| *c == '{' || *c == '[');
    let Some((start, open)) = opener else {
        return text.to_string();
    };
    let close = if open == '{' { '}' } else { ']' };
    match text.rfind(close) {
        Some(end) if end > start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

/// Drop commas that directly precede a closing bracket, outside strings.
fn collapse_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_rules() -> Vec<CleanupRule> {
        vec![]
    }

    #[test]
    fn strips_json_code_fence() {
        let raw = "```json\n{\"title\": \"Суп\"}\n```";
        assert_eq!(clean(raw, &no_rules()), "{\"title\": \"Суп\"}");
    }

    #[test]
    fn strips_bare_code_fence() {
        let raw = "```\n[1, 2]\n```";
        assert_eq!(clean(raw, &no_rules()), "[1, 2]");
    }

    #[test]
    fn trims_surrounding_prose() {
        let raw = "Here is the recipe you asked for:\n{\"title\": \"Суп\"}\nHope that helps!";
        assert_eq!(clean(raw, &no_rules()), "{\"title\": \"Суп\"}");
    }

    #[test]
    fn collapses_trailing_commas() {
        let raw = "{\"items\": [1, 2, ], }";
        assert_eq!(clean(raw, &no_rules()), "{\"items\": [1, 2 ] }");
    }

    #[test]
    fn leaves_commas_inside_strings_alone() {
        let raw = "{\"note\": \"add salt, }\"}";
        assert_eq!(clean(raw, &no_rules()), "{\"note\": \"add salt, }\"}");
    }

    #[test]
    fn no_json_span_returns_rule_cleaned_text() {
        let raw = "the model refused to answer";
        assert_eq!(clean(raw, &no_rules()), "the model refused to answer");
    }

    #[test]
    fn literal_rules_apply_in_stored_order() {
        let rules = vec![
            CleanupRule {
                pattern: "NaN".to_string(),
                replacement: "0".to_string(),
                regex: false,
            },
            CleanupRule {
                pattern: "00".to_string(),
                replacement: "1".to_string(),
                regex: false,
            },
        ];
        // The first rule produces "00", which only the second then rewrites;
        // reversed order would leave "[00]".
        assert_eq!(clean("[NaN0]", &rules), "[1]");
    }

    #[test]
    fn regex_rules_apply() {
        let rules = vec![CleanupRule {
            pattern: r"//[^\n]*".to_string(),
            replacement: String::new(),
            regex: true,
        }];
        let raw = "{\"a\": 1}// trailing comment";
        assert_eq!(clean(raw, &rules), "{\"a\": 1}");
    }

    #[test]
    fn invalid_regex_rule_is_skipped() {
        let rules = vec![CleanupRule {
            pattern: "[unclosed".to_string(),
            replacement: String::new(),
            regex: true,
        }];
        assert_eq!(clean("{\"a\": 1}", &rules), "{\"a\": 1}");
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let raw = "```json\n{\"a\": [1, 2,],}\n```";
        let first = clean(raw, &no_rules());
        let second = clean(raw, &no_rules());
        assert_eq!(first, second);
    }
}
