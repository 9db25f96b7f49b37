//! Bit-array state behind the username filter
//!
//! INVARIANTS:
//! - No false negatives: once `insert(key)` ran, `contains(key)` is true
//! - FPR ~= (1 - e^(-kn/m))^k

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitvec::prelude::*;
use chrono::{DateTime, Utc};

use super::hashing::compute_hash_positions;

/// One complete filter state. Built off to the side during a rebuild and
/// then published as a whole.
#[derive(Clone, Debug)]
pub struct FilterBits {
    /// Byte `i` holds bits `8i..8i+7`, least significant first
    bits: BitVec<u8, Lsb0>,
    /// Number of hash functions (k)
    k: usize,
    /// Size in bits (m)
    m: usize,
    /// Number of insertions (n), duplicates included
    n: usize,
    last_updated: DateTime<Utc>,
}

impl FilterBits {
    /// `m` and `k` are raised to at least one
    pub fn new(m: usize, k: usize) -> Self {
        let (m, k) = (m.max(1), k.max(1));
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            k,
            m,
            n: 0,
            last_updated: Utc::now(),
        }
    }

    /// Build a filter holding every key in `keys`
    pub fn from_keys<I, S>(m: usize, k: usize, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bits = Self::new(m, k);
        for key in keys {
            bits.insert(key.as_ref());
        }
        bits
    }

    /// Set the k bits for `key`. Keys are expected to be normalized.
    pub fn insert(&mut self, key: &str) {
        for pos in compute_hash_positions(key.as_bytes(), self.k, self.m) {
            self.bits.set(pos, true);
        }
        self.n += 1;
        self.last_updated = Utc::now();
    }

    pub fn contains(&self, key: &str) -> bool {
        compute_hash_positions(key.as_bytes(), self.k, self.m)
            .iter()
            .all(|&pos| self.bits[pos])
    }

    pub fn bits_set(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn size_bits(&self) -> usize {
        self.m
    }

    pub fn hash_count(&self) -> usize {
        self.k
    }

    pub fn item_count(&self) -> usize {
        self.n
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn fill_ratio(&self) -> f64 {
        self.bits_set() as f64 / self.m as f64
    }

    /// Formula: FPR = (1 - e^(-kn/m))^k
    pub fn estimated_false_positive_rate(&self) -> f64 {
        false_positive_rate(self.m, self.n, self.k)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bits.as_raw_slice())
    }
}

/// Expected false positive rate for m bits, n items, k hashes
pub fn false_positive_rate(m: usize, n: usize, k: usize) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powi(k as i32)
}
