//! Candidate usernames for suggestions and random generation.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::validation::MAX_USERNAME_LENGTH;

pub const ADJECTIVES: &[&str] = &[
    "swift", "bright", "cosmic", "cyber", "digital", "epic", "fast", "golden", "happy", "iron",
    "jade", "keen", "lucky", "magic", "noble", "prime", "quick", "rare", "silent", "tech",
    "ultra", "vivid", "wild", "zen",
];

pub const NOUNS: &[&str] = &[
    "arrow", "blade", "coder", "dragon", "eagle", "falcon", "ghost", "hawk", "iris", "joker",
    "knight", "lion", "matrix", "ninja", "oracle", "phoenix", "quest", "ranger", "shadow",
    "tiger", "unicorn", "viper", "wolf", "zero",
];

/// `adjective_noun<10..=999>`, cut to the maximum username length
pub fn random_username<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("swift");
    let noun = NOUNS.choose(rng).copied().unwrap_or("arrow");
    let number = rng.random_range(10..=999);
    truncate(format!("{adjective}_{noun}{number}"), MAX_USERNAME_LENGTH)
}

fn truncate(mut name: String, max: usize) -> String {
    if let Some((idx, _)) = name.char_indices().nth(max) {
        name.truncate(idx);
    }
    name
}

/// Longest prefix of `base` that leaves room for `suffix_len` characters
fn fit(base: &str, suffix_len: usize) -> &str {
    let room = MAX_USERNAME_LENGTH.saturating_sub(suffix_len);
    match base.char_indices().nth(room) {
        Some((idx, _)) => &base[..idx],
        None => base,
    }
}

/// Lazily produced alternatives to a taken username.
///
/// Yields at most `max_attempts` candidates, in this order: the base with
/// a 2-3 digit suffix (twice), `base_NN`, `adjective_base`, then random
/// usernames. Candidates are not validated here.
pub struct SuggestionCandidates<R> {
    base: String,
    rng: R,
    stage: usize,
    remaining: usize,
}

impl<R: Rng> SuggestionCandidates<R> {
    pub fn new(taken: &str, rng: R, max_attempts: usize) -> Self {
        let lowered = taken.to_lowercase();
        let stripped = lowered.trim_end_matches(|c: char| c.is_ascii_digit());
        let base = if stripped.chars().count() < 3 {
            lowered.clone()
        } else {
            stripped.to_string()
        };
        Self {
            base,
            rng,
            stage: 0,
            remaining: max_attempts,
        }
    }
}

impl<R: Rng> Iterator for SuggestionCandidates<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let stage = self.stage;
        self.stage += 1;
        let candidate = match stage {
            0 | 1 => {
                let number = self.rng.random_range(10..=999);
                let suffix = number.to_string();
                format!("{}{suffix}", fit(&self.base, suffix.len()))
            },
            2 => {
                let number = self.rng.random_range(10..=99);
                format!("{}_{number}", fit(&self.base, 3))
            },
            3 => {
                let adjective = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("swift");
                truncate(format!("{adjective}_{}", self.base), MAX_USERNAME_LENGTH)
            },
            _ => random_username(&mut self.rng),
        };
        Some(candidate)
    }
}
