//! Hash functions for the username filter
//!
//! Each of the k positions comes from its own SHA-256 digest over a
//! distinct seed prefix, so positions are independent of one another.

use sha2::{Digest, Sha256};

/// Seed prefix for hash function `i`
fn seed(i: usize) -> String {
    format!("bloom_seed_{i}")
}

/// Position of `key` under hash function `i` in an `m`-bit array.
/// An `m` of zero is treated as one.
pub fn seeded_position(key: &[u8], i: usize, m: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(seed(i).as_bytes());
    hasher.update(key);
    let digest = hasher.finalize();

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(word) % m.max(1) as u64) as usize
}

/// Compute k bit positions for a key
pub fn compute_hash_positions(key: &[u8], k: usize, m: usize) -> Vec<usize> {
    (0..k).map(|i| seeded_position(key, i, m)).collect()
}

/// Case-folded form used for every filter operation
pub fn normalize(username: &str) -> String {
    username.to_lowercase()
}
