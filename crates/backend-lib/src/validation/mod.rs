// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Username and password policy checks.
//!
//! Both policies are pure functions over the candidate string, so they can
//! be called from any number of request handlers without coordination.

mod password;
mod username;

pub use identity_common::StrengthLevel;
pub use password::{
    generate_secure_password, PasswordPolicy, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
    SPECIAL_CHARS,
};
pub use username::{shard_for, UsernamePolicy, MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH};

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// True iff `issues` is empty
    pub valid: bool,
    /// Hard requirement failures, in the order they were detected
    pub issues: Vec<String>,
    /// Advisory findings that lower the score without failing validation
    pub warnings: Vec<String>,
    /// 0-100
    pub score: u8,
    pub level: StrengthLevel,
}

impl ValidationResult {
    /// Build a result from a raw score; clamps and buckets it.
    pub(crate) fn scored(issues: Vec<String>, warnings: Vec<String>, raw_score: i32) -> Self {
        let score = raw_score.clamp(0, 100) as u8;
        Self {
            valid: issues.is_empty(),
            issues,
            warnings,
            score,
            level: StrengthLevel::from_score(score),
        }
    }

    pub(crate) fn pass() -> Self {
        Self::scored(Vec::new(), Vec::new(), 100)
    }

    pub(crate) fn fail(issue: impl Into<String>) -> Self {
        Self::scored(vec![issue.into()], Vec::new(), 0)
    }

    /// Issues joined into one user-facing sentence
    pub fn message(&self) -> String {
        if self.valid {
            "Valid".to_string()
        } else {
            self.issues.join(", ")
        }
    }
}
