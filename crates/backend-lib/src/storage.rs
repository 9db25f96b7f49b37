// ============================
// identity-backend/src/storage.rs
// ============================
//! Authoritative user store abstraction with in-memory and flat-file
//! implementations.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::validation::{shard_for, UsernamePolicy};

/// A registered user as the authoritative store keeps it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UsernameRecord {
    /// Lower-cased, policy-valid username
    pub username: String,
    /// First-letter shard bucket, 1-26
    pub shard: u8,
    /// Versioned password hash, if the user registered with a password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsernameRecord {
    /// Build a record for a username that has already passed policy checks
    pub fn new(username: &str, password_hash: Option<String>) -> Result<Self, AppError> {
        let validation = UsernamePolicy::validate(username);
        if !validation.valid {
            return Err(AppError::InvalidInput(validation.issues));
        }
        let username = username.to_lowercase();
        let shard = shard_for(&username)
            .ok_or_else(|| AppError::InvalidInput(vec!["Username must start with a letter".into()]))?;
        Ok(Self {
            username,
            shard,
            password_hash,
            created_at: Utc::now(),
        })
    }
}

/// Trait for the source of truth on registered usernames
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact (case-insensitive) existence check
    async fn exists_username(&self, username: &str) -> Result<bool, AppError>;

    /// Every registered username, used to rebuild the filter
    async fn list_all_usernames(&self) -> Result<Vec<String>, AppError>;

    /// Insert a new user; fails with `UsernameTaken` on a duplicate
    async fn create_user(&self, record: UsernameRecord) -> Result<(), AppError>;
}

/// Process-local store, keyed by lower-cased username
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<DashMap<String, UsernameRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with bare usernames (no password hash)
    pub fn with_usernames<I, S>(usernames: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = Self::new();
        for name in usernames {
            let record = UsernameRecord::new(name.as_ref(), None)?;
            store.users.insert(record.username.clone(), record);
        }
        Ok(store)
    }

    pub fn get(&self, username: &str) -> Option<UsernameRecord> {
        self.users
            .get(&username.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn exists_username(&self, username: &str) -> Result<bool, AppError> {
        Ok(self.users.contains_key(&username.to_lowercase()))
    }

    async fn list_all_usernames(&self) -> Result<Vec<String>, AppError> {
        Ok(self.users.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn create_user(&self, record: UsernameRecord) -> Result<(), AppError> {
        match self.users.entry(record.username.clone()) {
            Entry::Occupied(_) => Err(AppError::UsernameTaken(record.username)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            },
        }
    }
}

/// Flat-file store: one `users/<username>.json` file per user.
///
/// A record is written to a temporary file first and published with a
/// hard link, which fails if the name is already taken. A record file that
/// is empty or does not parse is left over from an interrupted write and
/// does not reserve its name.
#[derive(Clone)]
pub struct FlatFileUserStore {
    root: PathBuf,
    /// Serializes creates so replacing an abandoned record cannot race
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FlatFileUserStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let users = root.join("users");
        std::fs::create_dir_all(&users)?;

        // temp files from creates that never finished
        for entry in std::fs::read_dir(&users)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(TEMP_EXTENSION) {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove stale temp file");
                }
            }
        }

        Ok(Self {
            root,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    fn user_path(&self, username: &str) -> PathBuf {
        self.users_dir().join(format!("{username}.json"))
    }

    fn temp_path(&self, username: &str) -> PathBuf {
        let nonce: u64 = rand::rng().random();
        self.users_dir()
            .join(format!(".{username}.{nonce:016x}.{TEMP_EXTENSION}"))
    }

    /// Read back a stored record
    pub async fn read_user(&self, username: &str) -> Result<Option<UsernameRecord>, AppError> {
        let username = username.to_lowercase();
        if !UsernamePolicy::is_valid(&username) {
            return Ok(None);
        }
        load_record(&self.user_path(&username)).await
    }

    async fn publish(&self, record: &UsernameRecord, temp: &Path) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(record)?;
        let mut file = tokio_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)
            .await
            .map_err(store_io)?;
        file.write_all(json.as_bytes()).await.map_err(store_io)?;
        file.sync_all().await.map_err(store_io)?;
        drop(file);

        let path = self.user_path(&record.username);
        match tokio_fs::hard_link(temp, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if load_record(&path).await?.is_some() {
                    return Err(AppError::UsernameTaken(record.username.clone()));
                }
                warn!(username = %record.username, "replacing abandoned user record");
                tokio_fs::rename(temp, &path).await.map_err(store_io)
            },
            Err(e) => Err(store_io(e)),
        }
    }
}

const TEMP_EXTENSION: &str = "tmp";

/// `None` when the file is missing, empty or not a complete record
async fn load_record(path: &Path) -> Result<Option<UsernameRecord>, AppError> {
    let content = match tokio_fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(store_io(e)),
    };
    match serde_json::from_str(&content) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring incomplete user record");
            Ok(None)
        },
    }
}

fn store_io(err: std::io::Error) -> AppError {
    AppError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl UserStore for FlatFileUserStore {
    async fn exists_username(&self, username: &str) -> Result<bool, AppError> {
        // Anything the policy rejects cannot have been stored, and must not
        // be turned into a path.
        Ok(self.read_user(username).await?.is_some())
    }

    /// Lists every non-empty record file. A partially written file may
    /// still appear here; the filter then answers "maybe" and the
    /// authoritative lookup settles it.
    async fn list_all_usernames(&self) -> Result<Vec<String>, AppError> {
        let mut entries = tokio_fs::read_dir(self.users_dir())
            .await
            .map_err(store_io)?;

        let mut usernames = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(store_io)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if entry.metadata().await.map_err(store_io)?.len() == 0 {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                usernames.push(stem.to_string());
            }
        }
        Ok(usernames)
    }

    async fn create_user(&self, record: UsernameRecord) -> Result<(), AppError> {
        if !UsernamePolicy::is_valid(&record.username) {
            return Err(AppError::InvalidInput(UsernamePolicy::validate(&record.username).issues));
        }

        let _guard = self.write_lock.lock().await;
        let temp = self.temp_path(&record.username);
        let published = self.publish(&record, &temp).await;
        // gone already after a rename
        let _ = tokio_fs::remove_file(&temp).await;
        published
    }
}
