// ============================
// identity-backend/src/config.rs
// ============================
//! Configuration management.
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use zeroize::Zeroize;

/// Prefix for environment overrides, e.g. `IDENTITY_SERVER__BIND_ADDR`.
pub const ENV_PREFIX: &str = "IDENTITY_";

/// Default config file looked up by [`Settings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "identity.toml";

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub bloom: BloomSettings,
    pub store: StoreSettings,
    pub suggestions: SuggestionSettings,
    pub password: PasswordSettings,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
}

/// Username filter sizing and refresh cadence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Bit array size (M)
    pub size_bits: usize,
    /// Number of hash functions (K)
    pub hash_count: usize,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    FlatFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Root directory for the flat-file store
    pub data_dir: PathBuf,
    /// Bound on a single `exists_username` lookup
    pub lookup_timeout_ms: u64,
    /// Bound on the bulk read feeding a filter rebuild
    pub rebuild_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestionSettings {
    /// Suggestions returned for a taken username
    pub count: usize,
    /// Candidates examined before giving up on suggestions
    pub max_attempts: usize,
    /// Attempts allowed for `generate_random_username`
    pub random_attempts: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub pepper: Pepper,
    /// bcrypt cost factor
    pub cost: u32,
    /// Scheme identifier written into stored hashes
    pub app_name: String,
    pub version: u32,
}

/// Server-side secret mixed into every password hash.
///
/// Redacted from `Debug` output and wiped on drop.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Pepper(String);

impl Pepper {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pepper([REDACTED])")
    }
}

impl Drop for Pepper {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            bloom: BloomSettings::default(),
            store: StoreSettings::default(),
            suggestions: SuggestionSettings::default(),
            password: PasswordSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            size_bits: 100_000,
            hash_count: 7,
            refresh_interval_secs: 5 * 60,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::FlatFile,
            data_dir: PathBuf::from("data"),
            lookup_timeout_ms: 2_000,
            rebuild_timeout_ms: 30_000,
        }
    }
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            count: 5,
            max_attempts: 25,
            random_attempts: 10,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            pepper: Pepper::default(),
            cost: 12,
            app_name: "identity".to_string(),
            version: 1,
        }
    }
}

impl BloomSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl StoreSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_millis(self.rebuild_timeout_ms)
    }
}

/// Minimum pepper length accepted at startup
pub const MIN_PEPPER_LENGTH: usize = 16;

impl Settings {
    /// Load settings from `identity.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.password.pepper.len() < MIN_PEPPER_LENGTH {
            bail!(
                "password.pepper must be at least {MIN_PEPPER_LENGTH} bytes (set {ENV_PREFIX}PASSWORD__PEPPER)"
            );
        }
        if !(4..=31).contains(&self.password.cost) {
            bail!("password.cost must be between 4 and 31");
        }
        if self.bloom.size_bits == 0 || self.bloom.hash_count == 0 {
            bail!("bloom.size_bits and bloom.hash_count must be non-zero");
        }
        if self.suggestions.max_attempts < self.suggestions.count {
            bail!("suggestions.max_attempts must be >= suggestions.count");
        }
        if self.suggestions.random_attempts == 0 {
            bail!("suggestions.random_attempts must be non-zero");
        }
        Ok(())
    }
}
