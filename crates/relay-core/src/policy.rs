//! Content policy: banned patterns checked before anything is relayed.

use std::fmt;

use regex::RegexBuilder;

/// The first banned pattern a text matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub index: usize,
    pub pattern: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matched banned_regex[{}]: {}", self.index, self.pattern)
    }
}

/// Check `text` against `patterns` in order, case-insensitively.
///
/// Absent or empty text never violates. Patterns that fail to compile are
/// skipped: one bad rule must not disable the whole filter.
pub fn evaluate<S: AsRef<str>>(text: Option<&str>, patterns: &[S]) -> Option<Violation> {
    let text = text.filter(|t| !t.is_empty())?;

    for (index, pattern) in patterns.iter().enumerate() {
        let pattern = pattern.as_ref();
        let re = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(index, pattern, error = %e, "skipping malformed banned pattern");
                continue;
            }
        };
        if re.is_match(text) {
            return Some(Violation {
                index,
                pattern: pattern.to_string(),
            });
        }
    }

    None
}

/// Whether `pattern` compiles. Used to warn admins, never to reject.
pub fn is_valid_pattern(pattern: &str) -> bool {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::policy_config::{PHONE_PATTERN, USERNAME_PATTERN};

    fn defaults() -> Vec<String> {
        vec![USERNAME_PATTERN.to_string(), PHONE_PATTERN.to_string()]
    }

    #[test]
    fn username_mention_hits_first_rule() {
        let v = evaluate(Some("contact me @alice123"), &defaults()).unwrap();
        assert_eq!(v.index, 0);
        assert_eq!(v.pattern, USERNAME_PATTERN);
        assert_eq!(
            v.to_string(),
            format!("Matched banned_regex[0]: {USERNAME_PATTERN}")
        );
    }

    #[test]
    fn phone_numbers_hit_second_rule() {
        for text in ["call +7 912 345-67-89", "my number 89123456789 ok"] {
            let v = evaluate(Some(text), &defaults()).unwrap();
            assert_eq!(v.index, 1, "{text}");
        }
    }

    #[test]
    fn clean_or_empty_text_passes() {
        assert_eq!(evaluate(Some("hello world"), &defaults()), None);
        assert_eq!(evaluate(Some("room 101 at 5pm"), &defaults()), None);
        assert_eq!(evaluate(Some(""), &defaults()), None);
        assert_eq!(evaluate(None, &defaults()), None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let v = evaluate(Some("This is SECRET"), &["secret"]).unwrap();
        assert_eq!(v.index, 0);
    }

    #[test]
    fn first_matching_rule_wins() {
        let v = evaluate(Some("foo bar"), &["bar", "foo"]).unwrap();
        assert_eq!(v.index, 0);
        assert_eq!(v.pattern, "bar");
    }

    #[test]
    fn malformed_pattern_is_skipped() {
        let patterns = ["([unclosed", "bad"];
        let v = evaluate(Some("bad word"), &patterns).unwrap();
        assert_eq!(v.index, 1);
        assert_eq!(evaluate(Some("([unclosed"), &["([unclosed"]), None);
        assert!(!is_valid_pattern("([unclosed"));
        assert!(is_valid_pattern(PHONE_PATTERN));
    }
}
