use regex::Regex;
use std::sync::LazyLock;

use super::ValidationResult;

pub const MIN_USERNAME_LENGTH: usize = 6;
pub const MAX_USERNAME_LENGTH: usize = 18;

static USERNAME_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static regex"));

/// Format rules for usernames
pub struct UsernamePolicy;

impl UsernamePolicy {
    /// Check a candidate username. Rules apply in order and the first
    /// failure is the only issue reported.
    pub fn validate(candidate: &str) -> ValidationResult {
        if candidate.is_empty() {
            return ValidationResult::fail("Username is required");
        }

        let len = candidate.chars().count();
        if len < MIN_USERNAME_LENGTH {
            return ValidationResult::fail(format!(
                "Username must be at least {MIN_USERNAME_LENGTH} characters"
            ));
        }
        if len > MAX_USERNAME_LENGTH {
            return ValidationResult::fail(format!(
                "Username must be at most {MAX_USERNAME_LENGTH} characters"
            ));
        }

        if !candidate
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        {
            return ValidationResult::fail("Username must start with a letter");
        }

        if !USERNAME_CHARS_REGEX.is_match(candidate) {
            return ValidationResult::fail(
                "Username can only contain letters, numbers, underscore, dash, and dot",
            );
        }

        ValidationResult::pass()
    }

    pub fn is_valid(candidate: &str) -> bool {
        Self::validate(candidate).valid
    }
}

/// First-letter shard bucket: `a` = 1 ... `z` = 26.
///
/// Returns `None` when the name does not start with an ASCII letter.
pub fn shard_for(username: &str) -> Option<u8> {
    let first = username.chars().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    Some(first.to_ascii_lowercase() as u8 - b'a' + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_usernames() {
        assert!(UsernamePolicy::is_valid("alice123"));
        assert!(UsernamePolicy::is_valid("Bob_the.builder-1"));
        assert!(UsernamePolicy::is_valid("abcdef"));
        assert!(UsernamePolicy::is_valid("a".repeat(18).as_str()));
    }

    #[test]
    fn test_rejections_are_specific() {
        let result = UsernamePolicy::validate("");
        assert_eq!(result.issues, vec!["Username is required"]);

        let result = UsernamePolicy::validate("ab");
        assert!(!result.valid);
        assert_eq!(result.issues, vec!["Username must be at least 6 characters"]);

        let result = UsernamePolicy::validate(&"a".repeat(19));
        assert_eq!(result.issues, vec!["Username must be at most 18 characters"]);

        let result = UsernamePolicy::validate("9alice");
        assert!(!result.valid);
        assert_eq!(result.issues, vec!["Username must start with a letter"]);

        let result = UsernamePolicy::validate("alice smith");
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].contains("can only contain"));
    }

    #[test]
    fn test_first_failure_short_circuits() {
        // too short and starts with a digit: only the length issue is reported
        let result = UsernamePolicy::validate("9ab");
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].contains("at least"));
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(!UsernamePolicy::is_valid("émilie99"));
        assert!(!UsernamePolicy::is_valid("alice😀bob"));
    }

    #[test]
    fn test_shard_for() {
        assert_eq!(shard_for("alice123"), Some(1));
        assert_eq!(shard_for("Zed_here"), Some(26));
        assert_eq!(shard_for("mike.99"), Some(13));
        assert_eq!(shard_for("9lives"), None);
        assert_eq!(shard_for(""), None);
    }

    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
    }

    proptest! {
        #[test]
        fn accepted_usernames_satisfy_every_rule(candidate in "\\PC{0,24}") {
            let result = UsernamePolicy::validate(&candidate);
            let len = candidate.chars().count();
            let rules_hold = (MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len)
                && candidate.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && candidate.chars().all(is_allowed);
            prop_assert_eq!(result.valid, rules_hold);
        }

        #[test]
        fn well_formed_usernames_are_accepted(candidate in "[A-Za-z][A-Za-z0-9_.-]{5,17}") {
            prop_assert!(UsernamePolicy::is_valid(&candidate));
            prop_assert!(shard_for(&candidate).is_some());
        }

        #[test]
        fn leading_non_letter_is_rejected(candidate in "[0-9_.-][A-Za-z0-9_.-]{5,17}") {
            let result = UsernamePolicy::validate(&candidate);
            prop_assert!(!result.valid);
            prop_assert_eq!(result.issues[0].as_str(), "Username must start with a letter");
        }
    }
}
