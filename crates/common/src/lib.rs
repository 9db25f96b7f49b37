// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! shared between the identity server and its clients.
//! This module defines the JSON request/response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse strength bucket derived from a 0-100 score
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLevel {
    Weak,
    Fair,
    Good,
    Strong,
}

impl StrengthLevel {
    /// Bucket a clamped score: <40 weak, <60 fair, <80 good, else strong.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => StrengthLevel::Weak,
            40..=59 => StrengthLevel::Fair,
            60..=79 => StrengthLevel::Good,
            _ => StrengthLevel::Strong,
        }
    }
}

/// Query string for a username availability check
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UsernameQuery {
    pub username: String,
}

/// Answer to a username availability check
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResponse {
    /// Whether the username can be registered right now
    pub available: bool,
    /// Human-readable explanation
    pub message: String,
    /// Alternatives, only populated when the name is taken
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Set when the authoritative store could not be consulted
    #[serde(default)]
    pub degraded: bool,
}

/// A freshly generated username
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RandomUsernameResponse {
    pub username: String,
}

/// Password submitted for strength scoring
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StrengthRequest {
    pub password: String,
}

/// Result of a password strength evaluation
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StrengthResponse {
    pub valid: bool,
    pub score: u8,
    pub level: StrengthLevel,
    pub issues: Vec<String>,
    /// Findings that cost points without failing validation
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Registration request
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Registration outcome
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    /// Normalised (lower-cased) username as stored
    pub username: String,
    /// First-letter shard bucket, 1-26
    pub shard: u8,
    pub created_at: DateTime<Utc>,
}

/// Exported username filter for client-side pre-checks
///
/// `filter_data` is the base64 encoding of the bit array; byte `i` holds
/// bits `8i..8i+7`, least significant bit first.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BloomFilterData {
    pub filter_data: String,
    pub hash_count: usize,
    pub size: usize,
    pub item_count: usize,
    pub last_updated: DateTime<Utc>,
}
