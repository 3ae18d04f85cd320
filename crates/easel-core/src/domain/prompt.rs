//! Prompt template resolution.
//!
//! Templates carry placeholders in either `{{NAME}}` or `[NAME]` form.
//! Placeholders without a matching token are left literal; substitution
//! values are inserted verbatim (no recursive expansion).

use std::collections::HashMap;

/// Substitute every token into the template.
pub fn resolve(template: &str, tokens: &HashMap<String, String>) -> String {
    let mut resolved = template.to_string();
    for (name, value) in tokens {
        resolved = resolved
            .replace(&format!("{{{{{name}}}}}"), value)
            .replace(&format!("[{name}]"), value);
    }
    resolved
}

/// Does the template resolve to something worth sending to the provider?
pub fn resolves_to_empty(template: &str, tokens: &HashMap<String, String>) -> bool {
    resolve(template, tokens).trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_curly_placeholders() {
        let out = resolve("Hello {{NAME}}", &tokens(&[("NAME", "Ada")]));
        assert_eq!(out, "Hello Ada");
    }

    #[test]
    fn substitutes_bracket_placeholders() {
        let out = resolve("A [STYLE] portrait of [SUBJECT]", &tokens(&[
            ("STYLE", "cubist"),
            ("SUBJECT", "a heron"),
        ]));
        assert_eq!(out, "A cubist portrait of a heron");
    }

    #[test]
    fn same_token_covers_both_forms() {
        let out = resolve("{{NAME}} and [NAME]", &tokens(&[("NAME", "Ada")]));
        assert_eq!(out, "Ada and Ada");
    }

    #[test]
    fn unknown_placeholders_stay_literal() {
        let out = resolve("Hello {{NAME}}", &HashMap::new());
        assert_eq!(out, "Hello {{NAME}}");
    }

    #[test]
    fn empty_detection_sees_through_whitespace_substitutions() {
        assert!(resolves_to_empty("{{A}}", &tokens(&[("A", "  ")])));
        assert!(resolves_to_empty("   ", &HashMap::new()));
        assert!(!resolves_to_empty("x", &HashMap::new()));
    }
}
