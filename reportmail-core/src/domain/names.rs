//! Name normalization for entity keys
//!
//! Two names with the same normalized form are the same entity key.
//! `normalize` is pure, total and idempotent.

use std::sync::OnceLock;

use regex::Regex;

fn honorific_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^M\s*/\s*S(?:[^\p{L}\p{N}]|$)").expect("valid honorific regex"))
}

fn strip_honorific(upper: &str) -> &str {
    match honorific_re().find(upper) {
        Some(m) => &upper[m.end()..],
        None => upper,
    }
}

/// Uppercase, drop a leading "M/S" honorific, keep only alphanumerics.
pub fn normalize(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    strip_honorific(&upper)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Alphanumeric tokens of a name after honorific stripping
pub fn tokens(name: &str) -> Vec<String> {
    let upper = name.trim().to_uppercase();
    strip_honorific(&upper)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_honorific_and_punctuation() {
        assert_eq!(normalize(" M/s. Sharma & Co."), normalize("SHARMACO"));
        assert_eq!(normalize("M / S Gupta Traders"), "GUPTATRADERS");
        assert_eq!(normalize("m/s"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["M/S. Sharma & Co.", "Ravi  Kumar", "  ", "MS Dhoni Agencies", "J.S.B. Steel"] {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_honorific_needs_slash() {
        assert_eq!(normalize("MS Dhoni Agencies"), "MSDHONIAGENCIES");
    }

    #[test]
    fn test_tokens() {
        assert_eq!(tokens("M/S. Ravi-Kumar  Singh"), vec!["RAVI", "KUMAR", "SINGH"]);
        assert!(tokens("  ").is_empty());
    }
}
