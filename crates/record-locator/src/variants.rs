//! Identifier variant derivation.
//!
//! The target application is inconsistent about how it renders reference
//! codes: `KIWIWASTE-006` may appear as `006`, `6`, `Kiwiwaste--6` and so
//! on. `variants` derives the alternate forms in priority order so callers
//! can try them one by one and stop at the first hit. Pure and
//! deterministic; no I/O.

use invoicerelay_core_types::MappingRule;

const SEPARATORS: [char; 3] = ['-', '_', ' '];

/// Return the replacement of the first rule whose pattern is a
/// case-insensitive substring of `code`.
pub fn apply_mapping(rules: &[MappingRule], code: &str) -> Option<String> {
    let lowered = code.to_lowercase();
    rules
        .iter()
        .filter(|rule| !rule.pattern.is_empty())
        .find(|rule| lowered.contains(&rule.pattern.to_lowercase()))
        .map(|rule| rule.replacement.clone())
}

/// Ordered alternate forms of a reference code.
///
/// A matching mapping rule short-circuits the whole derivation: the
/// operator-supplied replacement becomes the sole search term. The result
/// always contains at least one non-empty string.
pub fn variants(code: &str, rules: &[MappingRule]) -> Vec<String> {
    if let Some(mapped) = apply_mapping(rules, code) {
        return vec![mapped];
    }

    let (prefix, suffix) = split_last_separator(code);
    let mut out = suffix_forms(suffix);

    if let Some(prefix) = prefix {
        let stripped = strip_leading_zeros(suffix);
        let mut suffixes = vec![suffix.to_string()];
        if let Some(stripped) = stripped {
            suffixes.push(stripped);
        }

        for name in [titlecase(prefix), prefix.to_uppercase()] {
            for sep in ["-", "--", " --"] {
                for s in &suffixes {
                    push_unique(&mut out, format!("{name}{sep}{s}"));
                }
            }
        }
    }

    out.retain(|v| !v.is_empty());
    if out.is_empty() {
        out.push(code.to_string());
    }
    out
}

/// Only the numeric-suffix forms: raw, fully zero-stripped, one zero
/// stripped. Used when scanning result rows for the item itself.
pub fn suffix_variants(code: &str) -> Vec<String> {
    let (_, suffix) = split_last_separator(code);
    let mut out = suffix_forms(suffix);
    out.retain(|v| !v.is_empty());
    if out.is_empty() {
        out.push(code.to_string());
    }
    out
}

fn suffix_forms(suffix: &str) -> Vec<String> {
    let mut out = vec![suffix.to_string()];

    if let Some(stripped) = strip_leading_zeros(suffix) {
        push_unique(&mut out, stripped);
    }

    // Two or more leading zeros: the target sometimes drops exactly one.
    if suffix.starts_with("00") {
        push_unique(&mut out, suffix[1..].to_string());
    }

    out
}

/// Split on the last separator occurrence; no separator means the whole
/// code is the suffix.
fn split_last_separator(code: &str) -> (Option<&str>, &str) {
    match code.rfind(&SEPARATORS[..]) {
        Some(idx) => {
            let (prefix, rest) = code.split_at(idx);
            let suffix = &rest[1..];
            if suffix.is_empty() {
                (None, code)
            } else {
                (Some(prefix), suffix)
            }
        }
        None => (None, code),
    }
}

/// Zero-stripped form, only when it differs and is non-empty.
fn strip_leading_zeros(suffix: &str) -> Option<String> {
    let stripped = suffix.trim_start_matches('0');
    if stripped.is_empty() || stripped == suffix {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn titlecase(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, replacement: &str) -> MappingRule {
        MappingRule {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn derives_suffix_and_zero_stripped_forms() {
        let v = variants("KIWIWASTE-006", &[]);
        assert_eq!(&v[..3], &["006", "6", "06"]);
        assert!(v.contains(&"Kiwiwaste-006".to_string()));
        assert!(v.contains(&"Kiwiwaste--6".to_string()));
        assert!(v.contains(&"KIWIWASTE --006".to_string()));
    }

    #[test]
    fn single_leading_zero_has_no_one_zero_form() {
        let v = variants("ACME-012", &[]);
        assert_eq!(&v[..2], &["012", "12"]);
        // Only two suffix forms: "12" is both the full strip and the
        // one-zero strip.
        assert!(!v[2..].contains(&"12".to_string()));
    }

    #[test]
    fn no_separator_keeps_whole_code_as_suffix() {
        let v = variants("12345", &[]);
        assert_eq!(v, vec!["12345"]);
    }

    #[test]
    fn trailing_separator_falls_back_to_raw_code() {
        let v = variants("ACME-", &[]);
        assert_eq!(v[0], "ACME-");
    }

    #[test]
    fn underscore_and_space_separators_split() {
        assert_eq!(suffix_variants("PO_007"), vec!["007", "7", "07"]);
        assert_eq!(suffix_variants("ORDER 052"), vec!["052", "52"]);
    }

    #[test]
    fn mapping_rule_bypasses_derivation() {
        let rules = vec![rule("kiwiwaste", "Kiwi Waste Services")];
        let v = variants("KIWIWASTE-006", &rules);
        assert_eq!(v, vec!["Kiwi Waste Services"]);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![rule("acme", "First"), rule("ACME-0", "Second")];
        assert_eq!(apply_mapping(&rules, "ACME-012"), Some("First".to_string()));
    }

    #[test]
    fn non_matching_rules_are_ignored() {
        let rules = vec![rule("other", "Other Co")];
        let v = variants("ACME-012", &rules);
        assert_eq!(&v[..2], &["012", "12"]);
    }

    #[test]
    fn all_zero_suffix_keeps_nonempty_forms() {
        let v = suffix_variants("JOB-000");
        assert_eq!(v, vec!["000", "00"]);
    }

    #[test]
    fn result_is_never_empty() {
        assert!(!variants("X", &[]).is_empty());
        assert!(!suffix_variants("X-").is_empty());
    }
}
