// ============================
// identity-backend/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! Stored format: `$<app_name>$v<version>$<bcrypt hash>`.
//!
//! 1. HMAC-SHA256 of the password keyed with the pepper
//! 2. XOR with SHA-256(salt || pepper), salt being the bcrypt salt
//! 3. bcrypt over the base64 of the result
//! 4. scheme/version prefix
use base64::{
    alphabet,
    engine::{general_purpose, GeneralPurpose},
    Engine as _,
};
use bcrypt::Version;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::config::{PasswordSettings, Pepper};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// bcrypt's own base64 dialect, used to recover the salt from a stored hash
const BCRYPT_B64: GeneralPurpose = GeneralPurpose::new(&alphabet::BCRYPT, general_purpose::NO_PAD);

const SALT_LEN: usize = 16;
/// Encoded length of a 16-byte bcrypt salt
const ENCODED_SALT_LEN: usize = 22;

/// Immutable hasher configuration, built once at startup
#[derive(Debug, Clone)]
pub struct HasherConfig {
    pub pepper: Pepper,
    /// bcrypt cost factor
    pub cost: u32,
    pub app_name: String,
    pub version: u32,
}

impl HasherConfig {
    pub fn new(pepper: Pepper) -> Self {
        Self {
            pepper,
            cost: 12,
            app_name: "identity".to_string(),
            version: 1,
        }
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }
}

impl From<&PasswordSettings> for HasherConfig {
    fn from(settings: &PasswordSettings) -> Self {
        Self {
            pepper: settings.pepper.clone(),
            cost: settings.cost,
            app_name: settings.app_name.clone(),
            version: settings.version,
        }
    }
}

/// Peppered, versioned bcrypt hasher
#[derive(Debug)]
pub struct PasswordHasher {
    config: HasherConfig,
    /// `$<app_name>$v<version>$`
    prefix: String,
}

impl PasswordHasher {
    pub fn new(config: HasherConfig) -> Result<Self, AppError> {
        if config.pepper.is_empty() {
            return Err(AppError::Config("password pepper must not be empty".into()));
        }
        if !(4..=31).contains(&config.cost) {
            return Err(AppError::Config(format!(
                "bcrypt cost must be between 4 and 31, got {}",
                config.cost
            )));
        }
        if config.app_name.is_empty() || config.app_name.contains('$') {
            return Err(AppError::Config(
                "scheme name must be non-empty and must not contain '$'".into(),
            ));
        }

        let prefix = format!("${}$v{}$", config.app_name, config.version);
        Ok(Self { config, prefix })
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill(&mut salt);

        let material = self.prehash(password, &salt)?;
        let parts = bcrypt::hash_with_salt(material.as_bytes(), self.config.cost, salt)?;
        Ok(format!(
            "{}{}",
            self.prefix,
            parts.format_for_version(Version::TwoB)
        ))
    }

    /// Hash a password and wipe the plaintext
    pub fn hash_and_zeroize(&self, plain: &mut String) -> Result<String, AppError> {
        let hash = self.hash(plain);
        plain.zeroize();
        hash
    }

    /// Check a password against a stored value. Any malformed or foreign
    /// stored value verifies as `false`.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some(inner) = stored.strip_prefix(&self.prefix) else {
            return false;
        };
        let Some(salt) = extract_salt(inner) else {
            return false;
        };
        let Ok(material) = self.prehash(password, &salt) else {
            return false;
        };
        // bcrypt compares digests in constant time
        bcrypt::verify(material.as_bytes(), inner).unwrap_or(false)
    }

    /// Whether a stored value was produced by another scheme version or cost
    pub fn needs_rehash(&self, stored: &str) -> bool {
        match stored.strip_prefix(&self.prefix).and_then(extract_cost) {
            Some(cost) => cost != self.config.cost,
            None => true,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Steps 1-3 of the pipeline up to the bcrypt input
    fn prehash(&self, password: &str, salt: &[u8; SALT_LEN]) -> Result<Zeroizing<String>, AppError> {
        let mut mac = HmacSha256::new_from_slice(self.config.pepper.as_bytes())
            .map_err(|e| AppError::Hashing(e.to_string()))?;
        mac.update(password.as_bytes());
        let mut peppered: [u8; 32] = mac.finalize().into_bytes().into();

        let mut derive = Sha256::new();
        derive.update(salt);
        derive.update(self.config.pepper.as_bytes());
        let derived = derive.finalize();

        for (byte, key) in peppered.iter_mut().zip(derived.iter()) {
            *byte ^= key;
        }
        let encoded = Zeroizing::new(general_purpose::STANDARD.encode(peppered));
        peppered.zeroize();
        Ok(encoded)
    }
}

/// `$2b$12$<22 salt chars><31 hash chars>` -> raw salt
fn extract_salt(bcrypt_hash: &str) -> Option<[u8; SALT_LEN]> {
    let tail = bcrypt_hash.split('$').nth(3)?;
    let encoded = tail.get(..ENCODED_SALT_LEN)?;
    BCRYPT_B64.decode(encoded).ok()?.try_into().ok()
}

fn extract_cost(bcrypt_hash: &str) -> Option<u32> {
    bcrypt_hash.split('$').nth(2)?.parse().ok()
}
