// ============================
// identity-backend/src/lib.rs
// ============================
//! Core backend functionality for the identity server: username and
//! password policy, the username filter, availability checks, password
//! hashing and the HTTP routes that expose them.

pub mod auth;
pub mod availability;
pub mod bloom;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use crate::auth::{HasherConfig, PasswordHasher};
use crate::availability::{AvailabilityOptions, UsernameAvailabilityService};
use crate::bloom::BloomFilter;
use crate::config::{Settings, StoreKind};
use crate::error::AppError;
use crate::storage::{FlatFileUserStore, InMemoryUserStore, UserStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Username availability, suggestions and registration
    pub availability: Arc<UsernameAvailabilityService>,
    /// Password hasher
    pub hasher: Arc<PasswordHasher>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create application state around an existing store
    pub fn new(store: Arc<dyn UserStore>, settings: Settings) -> Result<Self, AppError> {
        let filter = Arc::new(BloomFilter::new(
            settings.bloom.size_bits,
            settings.bloom.hash_count,
        ));
        let availability = Arc::new(UsernameAvailabilityService::new(
            store,
            filter,
            AvailabilityOptions::from(&settings),
        ));
        let hasher = Arc::new(PasswordHasher::new(HasherConfig::from(&settings.password))?);

        Ok(Self {
            availability,
            hasher,
            settings: Arc::new(settings),
        })
    }

    /// Create application state with the store selected by `settings.store.kind`
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match settings.store.kind {
            StoreKind::Memory => Arc::new(InMemoryUserStore::new()),
            StoreKind::FlatFile => Arc::new(FlatFileUserStore::new(&settings.store.data_dir)?),
        };
        Ok(Self::new(store, settings)?)
    }
}
