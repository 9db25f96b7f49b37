use rand::seq::{IndexedRandom, SliceRandom};

use super::ValidationResult;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// Maximum password length
pub const MAX_PASSWORD_LENGTH: usize = 128;
/// Characters that count towards the special-character requirement
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;':\",./<>?";

const PATTERN_WARNING: &str = "No sequential or repeated patterns";

/// Password complexity requirements and strength scoring
pub struct PasswordPolicy;

impl PasswordPolicy {
    /// Score a candidate password.
    ///
    /// Length tiers (8/12/16) and each character class are worth 10 points,
    /// using three classes adds 10 and all four another 10. Repeated or
    /// ascending runs cost 10 points and produce a warning, not an issue.
    pub fn validate(candidate: &str) -> ValidationResult {
        if candidate.is_empty() {
            return ValidationResult::fail("Password is required");
        }

        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut score: i32 = 0;

        let length = candidate.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            issues.push(format!("At least {MIN_PASSWORD_LENGTH} characters"));
        }
        if length > MAX_PASSWORD_LENGTH {
            issues.push(format!("Maximum {MAX_PASSWORD_LENGTH} characters"));
        }
        for tier in [8, 12, 16] {
            if length >= tier {
                score += 10;
            }
        }

        let classes = [
            (
                candidate.chars().any(|c| c.is_ascii_uppercase()),
                "One uppercase letter",
            ),
            (
                candidate.chars().any(|c| c.is_ascii_lowercase()),
                "One lowercase letter",
            ),
            (candidate.chars().any(|c| c.is_ascii_digit()), "One number"),
            (
                candidate.chars().any(|c| SPECIAL_CHARS.contains(c)),
                "One special character (!@#$%^&*...)",
            ),
        ];

        let mut present = 0;
        for (found, issue) in classes {
            if found {
                score += 10;
                present += 1;
            } else {
                issues.push(issue.to_string());
            }
        }
        if present >= 3 {
            score += 10;
        }
        if present == 4 {
            score += 10;
        }

        if has_weak_pattern(candidate) {
            score -= 10;
            warnings.push(PATTERN_WARNING.to_string());
        }

        ValidationResult::scored(issues, warnings, score)
    }
}

/// Three identical characters in a row, or three ascending digits/letters
/// (case-insensitive) such as `123` or `aBc`.
fn has_weak_pattern(candidate: &str) -> bool {
    let chars: Vec<char> = candidate.chars().map(|c| c.to_ascii_lowercase()).collect();
    chars.windows(3).any(|w| {
        let (a, b, c) = (w[0], w[1], w[2]);
        if a == b && b == c {
            return true;
        }
        let same_class = (a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit())
            || (a.is_ascii_lowercase() && b.is_ascii_lowercase() && c.is_ascii_lowercase());
        same_class && b as u32 == a as u32 + 1 && c as u32 == b as u32 + 1
    })
}

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const GENERATED_SPECIALS: &[u8] = b"!@#$%^&*()_+-=";

/// Generate a random password with at least one character of every class.
///
/// Lengths below [`MIN_PASSWORD_LENGTH`] are raised to it.
pub fn generate_secure_password(length: usize) -> String {
    let length = length.max(MIN_PASSWORD_LENGTH);
    let mut rng = rand::rng();

    let all: Vec<u8> = [UPPER, LOWER, DIGITS, GENERATED_SPECIALS].concat();
    let mut password: Vec<u8> = [UPPER, LOWER, DIGITS, GENERATED_SPECIALS]
        .iter()
        .filter_map(|set| set.choose(&mut rng).copied())
        .collect();
    while password.len() < length {
        if let Some(&c) = all.choose(&mut rng) {
            password.push(c);
        }
    }
    password.shuffle(&mut rng);

    password.into_iter().map(char::from).collect()
}
