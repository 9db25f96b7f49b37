// ============================
// crates/backend-lib/src/bloom/mod.rs
// ============================
//! Shared username filter.
//!
//! Readers take a short read lock to test k bits. `insert` takes the write
//! lock only long enough to set k bits. `rebuild` builds a complete
//! replacement without holding any lock and swaps it in, so a reader sees
//! either the old filter or the new one, never a partially built state.
//!
//! Inserts that happen while a rebuild is in flight (between
//! [`BloomFilter::begin_rebuild`] and [`BloomFilter::rebuild`]) are recorded
//! in a journal and replayed into the replacement before it is published.

mod bits;
mod hashing;

pub use bits::{false_positive_rate, FilterBits};
pub use hashing::{compute_hash_positions, normalize};

use chrono::{DateTime, Utc};
use identity_common::BloomFilterData;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Default bit array size (M)
pub const DEFAULT_SIZE_BITS: usize = 100_000;
/// Default number of hash functions (K)
pub const DEFAULT_HASH_COUNT: usize = 7;

/// Point-in-time statistics of the filter
#[derive(Debug, Clone)]
pub struct FilterStats {
    pub size_bits: usize,
    pub hash_count: usize,
    pub item_count: usize,
    pub bits_set: usize,
    pub fill_ratio: f64,
    pub estimated_false_positive_rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Concurrent probabilistic set of taken usernames
pub struct BloomFilter {
    current: RwLock<FilterBits>,
    /// `Some` while a rebuild is collecting its source data
    journal: Mutex<Option<Vec<String>>>,
    m: usize,
    k: usize,
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_BITS, DEFAULT_HASH_COUNT)
    }
}

impl BloomFilter {
    /// Create an empty filter with `m` bits and `k` hash functions.
    /// Zero for either is raised to one.
    pub fn new(m: usize, k: usize) -> Self {
        let (m, k) = (m.max(1), k.max(1));
        Self {
            current: RwLock::new(FilterBits::new(m, k)),
            journal: Mutex::new(None),
            m,
            k,
        }
    }

    /// Add a username. Idempotent with respect to membership.
    pub fn insert(&self, username: &str) {
        let key = normalize(username);
        let mut journal = self.journal.lock();
        self.current.write().insert(&key);
        if let Some(pending) = journal.as_mut() {
            pending.push(key);
        }
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn maybe_contains(&self, username: &str) -> bool {
        let key = normalize(username);
        self.current.read().contains(&key)
    }

    /// Start journaling inserts ahead of a [`rebuild`](Self::rebuild).
    ///
    /// Call this before reading the authoritative username list so that
    /// names accepted while the list is being read are not lost.
    pub fn begin_rebuild(&self) {
        let mut journal = self.journal.lock();
        if journal.is_none() {
            *journal = Some(Vec::new());
        }
    }

    /// Whether inserts are currently being journaled for a rebuild
    pub fn rebuild_in_progress(&self) -> bool {
        self.journal.lock().is_some()
    }

    /// Drop the journal after a failed source read; the current state stays.
    pub fn abandon_rebuild(&self) {
        *self.journal.lock() = None;
    }

    /// Replace the filter with one holding exactly `usernames` plus any
    /// journaled inserts. Returns the number of names loaded.
    pub fn rebuild<I, S>(&self, usernames: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fresh = FilterBits::from_keys(
            self.m,
            self.k,
            usernames.into_iter().map(|name| normalize(name.as_ref())),
        );
        let loaded = fresh.item_count();

        let mut journal = self.journal.lock();
        if let Some(pending) = journal.take() {
            debug!(replayed = pending.len(), "replaying inserts made during rebuild");
            for key in &pending {
                fresh.insert(key);
            }
        }
        *self.current.write() = fresh;

        loaded
    }

    pub fn stats(&self) -> FilterStats {
        let bits = self.current.read();
        FilterStats {
            size_bits: bits.size_bits(),
            hash_count: bits.hash_count(),
            item_count: bits.item_count(),
            bits_set: bits.bits_set(),
            fill_ratio: bits.fill_ratio(),
            estimated_false_positive_rate: bits.estimated_false_positive_rate(),
            last_updated: bits.last_updated(),
        }
    }

    /// Export the current state for client-side checks
    pub fn snapshot(&self) -> BloomFilterData {
        let bits = self.current.read();
        BloomFilterData {
            filter_data: bits.to_base64(),
            hash_count: bits.hash_count(),
            size: bits.size_bits(),
            item_count: bits.item_count(),
            last_updated: bits.last_updated(),
        }
    }
}
