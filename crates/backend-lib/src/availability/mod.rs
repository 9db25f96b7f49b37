// ============================
// crates/backend-lib/src/availability/mod.rs
// ============================
//! Username availability: policy check, filter pre-check, authoritative
//! fallback, suggestions, registration and background filter refresh.

mod suggestions;

pub use suggestions::{random_username, SuggestionCandidates, ADJECTIVES, NOUNS};

use std::sync::Arc;
use std::time::Duration;

use identity_common::AvailabilityResponse;
use metrics::{counter, gauge};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bloom::BloomFilter;
use crate::config::Settings;
use crate::error::AppError;
use crate::metrics as keys;
use crate::storage::{UserStore, UsernameRecord};
use crate::validation::UsernamePolicy;

/// Tunables for [`UsernameAvailabilityService`]
#[derive(Debug, Clone)]
pub struct AvailabilityOptions {
    pub lookup_timeout: Duration,
    pub rebuild_timeout: Duration,
    pub suggestion_count: usize,
    pub suggestion_max_attempts: usize,
    pub random_attempts: usize,
}

impl Default for AvailabilityOptions {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(2),
            rebuild_timeout: Duration::from_secs(30),
            suggestion_count: 5,
            suggestion_max_attempts: 25,
            random_attempts: 10,
        }
    }
}

impl From<&Settings> for AvailabilityOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lookup_timeout: settings.store.lookup_timeout(),
            rebuild_timeout: settings.store.rebuild_timeout(),
            suggestion_count: settings.suggestions.count,
            suggestion_max_attempts: settings.suggestions.max_attempts,
            random_attempts: settings.suggestions.random_attempts,
        }
    }
}

pub struct UsernameAvailabilityService {
    store: Arc<dyn UserStore>,
    filter: Arc<BloomFilter>,
    options: AvailabilityOptions,
    /// Serializes rebuilds so only one journal is open at a time
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl UsernameAvailabilityService {
    pub fn new(
        store: Arc<dyn UserStore>,
        filter: Arc<BloomFilter>,
        options: AvailabilityOptions,
    ) -> Self {
        Self {
            store,
            filter,
            options,
            rebuild_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn filter(&self) -> &Arc<BloomFilter> {
        &self.filter
    }

    pub fn options(&self) -> &AvailabilityOptions {
        &self.options
    }

    /// Answer whether `candidate` can be registered.
    ///
    /// A filter miss is final. A filter hit is confirmed against the store;
    /// if the store cannot answer in time the name is reported unavailable
    /// with `degraded` set.
    pub async fn check_availability(&self, candidate: &str) -> AvailabilityResponse {
        counter!(keys::AVAILABILITY_CHECK).increment(1);

        let validation = UsernamePolicy::validate(candidate);
        if !validation.valid {
            return AvailabilityResponse {
                available: false,
                message: validation.message(),
                suggestions: Vec::new(),
                degraded: false,
            };
        }

        let name = candidate.to_lowercase();
        match self.is_taken(&name).await {
            Ok(false) => AvailabilityResponse {
                available: true,
                message: "Username is available".to_string(),
                suggestions: Vec::new(),
                degraded: false,
            },
            Ok(true) => AvailabilityResponse {
                available: false,
                message: "Username is taken".to_string(),
                suggestions: self.suggest(&name).await,
                degraded: false,
            },
            Err(e) => {
                counter!(keys::STORE_FALLBACK_FAILED).increment(1);
                warn!(username = %name, error = %e, "authoritative username lookup failed");
                AvailabilityResponse {
                    available: false,
                    message: "Username availability could not be verified".to_string(),
                    suggestions: Vec::new(),
                    degraded: true,
                }
            },
        }
    }

    /// Up to `suggestion_count` available alternatives to a taken name
    pub async fn suggest(&self, taken: &str) -> Vec<String> {
        self.suggest_with(taken, StdRng::from_os_rng()).await
    }

    /// [`suggest`](Self::suggest) with a caller-supplied RNG
    pub async fn suggest_with<R: Rng + Send>(&self, taken: &str, rng: R) -> Vec<String> {
        let mut accepted: Vec<String> = Vec::new();
        let candidates =
            SuggestionCandidates::new(taken, rng, self.options.suggestion_max_attempts);

        for candidate in candidates {
            if accepted.len() >= self.options.suggestion_count {
                break;
            }
            if candidate == taken
                || accepted.contains(&candidate)
                || !UsernamePolicy::is_valid(&candidate)
            {
                continue;
            }
            match self.is_taken(&candidate).await {
                Ok(false) => accepted.push(candidate),
                Ok(true) => {},
                Err(e) => debug!(candidate = %candidate, error = %e, "skipping unverifiable suggestion"),
            }
        }

        if accepted.is_empty() {
            counter!(keys::SUGGESTIONS_EXHAUSTED).increment(1);
            debug!(base = %taken, "no suggestions found within attempt cap");
        }
        accepted
    }

    /// A policy-valid username that is currently available
    pub async fn generate_random_username(&self) -> Result<String, AppError> {
        let mut rng = StdRng::from_os_rng();
        let attempts = self.options.random_attempts;

        for _ in 0..attempts {
            let candidate = random_username(&mut rng);
            if !UsernamePolicy::is_valid(&candidate) {
                continue;
            }
            match self.is_taken(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => {},
                Err(e) => debug!(candidate = %candidate, error = %e, "random username unverifiable"),
            }
        }

        counter!(keys::SUGGESTIONS_EXHAUSTED).increment(1);
        Err(AppError::SuggestionExhausted { attempts })
    }

    /// Create a user. Uniqueness is always confirmed against the store,
    /// whatever the filter says, and an unreachable store fails closed.
    pub async fn register(
        &self,
        username: &str,
        password_hash: Option<String>,
    ) -> Result<UsernameRecord, AppError> {
        let record = UsernameRecord::new(username, password_hash)?;
        self.ensure_registrable(&record.username).await?;

        match timeout(
            self.options.lookup_timeout,
            self.store.create_user(record.clone()),
        )
        .await
        {
            Ok(Ok(())) => {},
            Ok(Err(AppError::StoreUnavailable(reason))) => {
                return Err(AppError::AvailabilityUnknown(reason));
            },
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(AppError::AvailabilityUnknown("user creation timed out".into()));
            },
        }

        // Visible to other callers before the next scheduled rebuild
        self.filter.insert(&record.username);
        counter!(keys::USER_REGISTERED).increment(1);
        info!(username = %record.username, shard = record.shard, "user registered");

        Ok(record)
    }

    /// Policy check plus an authoritative existence lookup. Returns the
    /// normalized name.
    ///
    /// Callers with expensive per-registration work (password hashing) run
    /// this first; [`register`](Self::register) repeats it before creating.
    pub async fn ensure_registrable(&self, username: &str) -> Result<String, AppError> {
        let validation = UsernamePolicy::validate(username);
        if !validation.valid {
            return Err(AppError::InvalidInput(validation.issues));
        }
        let name = username.to_lowercase();

        let exists = timeout(self.options.lookup_timeout, self.store.exists_username(&name))
            .await
            .map_err(|_| AppError::AvailabilityUnknown("existence check timed out".into()))?
            .map_err(|e| AppError::AvailabilityUnknown(e.to_string()))?;
        if exists {
            return Err(AppError::UsernameTaken(name));
        }
        Ok(name)
    }

    /// Reload the filter from the store. On failure the previous filter
    /// stays in place.
    pub async fn rebuild_filter(&self) -> Result<usize, AppError> {
        let _guard = self.rebuild_lock.lock().await;
        self.filter.begin_rebuild();
        // dropped before the lock guard, so the journal closes on every exit
        let mut journal = OpenJournal {
            filter: &self.filter,
            armed: true,
        };

        let listing = match timeout(self.options.rebuild_timeout, self.store.list_all_usernames()).await
        {
            Ok(result) => result,
            Err(elapsed) => Err(AppError::from(elapsed)),
        };

        match listing {
            Ok(usernames) => {
                let loaded = self.filter.rebuild(&usernames);
                journal.armed = false;
                let stats = self.filter.stats();
                counter!(keys::FILTER_REBUILD).increment(1);
                gauge!(keys::FILTER_ITEMS).set(stats.item_count as f64);
                gauge!(keys::FILTER_FILL_RATIO).set(stats.fill_ratio);
                info!(
                    loaded,
                    fill_ratio = stats.fill_ratio,
                    estimated_fpr = stats.estimated_false_positive_rate,
                    "username filter rebuilt"
                );
                Ok(loaded)
            },
            Err(e) => {
                counter!(keys::FILTER_REBUILD_FAILED).increment(1);
                warn!(error = %e, "username filter rebuild failed, keeping last good filter");
                Err(e)
            },
        }
    }

    /// Rebuild the filter every `period`, starting one period from now.
    pub fn spawn_refresh_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // failures are logged inside and must not end the loop
                let _ = service.rebuild_filter().await;
            }
        })
    }

    /// Filter pre-check, then an authoritative lookup on a filter hit
    async fn is_taken(&self, name: &str) -> Result<bool, AppError> {
        if !self.filter.maybe_contains(name) {
            counter!(keys::FILTER_NEGATIVE).increment(1);
            return Ok(false);
        }

        let exists = timeout(self.options.lookup_timeout, self.store.exists_username(name)).await??;
        if !exists {
            counter!(keys::FILTER_FALSE_POSITIVE).increment(1);
        }
        Ok(exists)
    }
}

/// Abandons an open rebuild journal unless disarmed after publishing,
/// including when the rebuild future is dropped mid-read.
struct OpenJournal<'a> {
    filter: &'a BloomFilter,
    armed: bool,
}

impl Drop for OpenJournal<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.filter.abandon_rebuild();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryUserStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that never answers in time
    struct StalledStore;

    #[async_trait]
    impl UserStore for StalledStore {
        async fn exists_username(&self, _: &str) -> Result<bool, AppError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(false)
        }
        async fn list_all_usernames(&self) -> Result<Vec<String>, AppError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
        async fn create_user(&self, _: UsernameRecord) -> Result<(), AppError> {
            Ok(())
        }
    }

    /// Store that errors on every call
    struct DownStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for DownStore {
        async fn exists_username(&self, _: &str) -> Result<bool, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::StoreUnavailable("connection refused".into()))
        }
        async fn list_all_usernames(&self) -> Result<Vec<String>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::StoreUnavailable("connection refused".into()))
        }
        async fn create_user(&self, _: UsernameRecord) -> Result<(), AppError> {
            Err(AppError::StoreUnavailable("connection refused".into()))
        }
    }

    fn options() -> AvailabilityOptions {
        AvailabilityOptions {
            lookup_timeout: Duration::from_millis(200),
            rebuild_timeout: Duration::from_millis(200),
            ..AvailabilityOptions::default()
        }
    }

    async fn service_with(names: &[&str]) -> UsernameAvailabilityService {
        let store = InMemoryUserStore::with_usernames(names.iter().copied()).unwrap();
        let service = UsernameAvailabilityService::new(
            Arc::new(store),
            Arc::new(BloomFilter::default()),
            options(),
        );
        service.rebuild_filter().await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_invalid_username_rejected_without_suggestions() {
        let service = service_with(&[]).await;
        let result = service.check_availability("ab").await;
        assert!(!result.available);
        assert_eq!(result.message, "Username must be at least 6 characters");
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_taken_username_gets_suggestions() {
        let service = service_with(&["alice123"]).await;
        let result = service.check_availability("Alice123").await;
        assert!(!result.available);
        assert!(!result.degraded);
        assert!(!result.suggestions.is_empty());
        for suggestion in &result.suggestions {
            assert!(UsernamePolicy::is_valid(suggestion));
            assert_ne!(suggestion, "alice123");
        }
    }

    #[tokio::test]
    async fn test_filter_false_positive_resolved_by_store() {
        let service = service_with(&[]).await;
        // in the filter but not in the store
        service.filter().insert("ghost_user1");
        let result = service.check_availability("ghost_user1").await;
        assert!(result.available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_fails_closed() {
        let service = UsernameAvailabilityService::new(
            Arc::new(StalledStore),
            Arc::new(BloomFilter::default()),
            options(),
        );
        service.filter().insert("slowpoke_1");

        let result = service.check_availability("slowpoke_1").await;
        assert!(!result.available);
        assert!(result.degraded);
        assert!(result.suggestions.is_empty());

        // a filter miss needs no store round trip and stays fast
        let result = service.check_availability("someone_else").await;
        assert!(result.available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_timeout_keeps_last_good_filter() {
        let service = UsernameAvailabilityService::new(
            Arc::new(StalledStore),
            Arc::new(BloomFilter::default()),
            options(),
        );
        service.filter().insert("survivor_1");

        let err = service.rebuild_filter().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(service.filter().maybe_contains("survivor_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_rebuild_closes_journal() {
        let service = UsernameAvailabilityService::new(
            Arc::new(StalledStore),
            Arc::new(BloomFilter::default()),
            options(),
        );

        // caller gives up before the rebuild's own timeout fires
        let outcome = timeout(Duration::from_millis(50), service.rebuild_filter()).await;
        assert!(outcome.is_err());
        assert!(!service.filter().rebuild_in_progress());

        // a failed rebuild closes it too
        assert!(service.rebuild_filter().await.is_err());
        assert!(!service.filter().rebuild_in_progress());
    }

    #[tokio::test]
    async fn test_register_fails_closed_when_store_down() {
        let store = Arc::new(DownStore {
            calls: AtomicUsize::new(0),
        });
        let service = UsernameAvailabilityService::new(
            store.clone(),
            Arc::new(BloomFilter::default()),
            options(),
        );

        // filter says absent, but registration still consults the store
        let err = service.register("newcomer_1", None).await.unwrap_err();
        assert!(matches!(err, AppError::AvailabilityUnknown(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(!service.filter().maybe_contains("newcomer_1"));
    }

    #[tokio::test]
    async fn test_register_then_unavailable() {
        let service = service_with(&[]).await;
        let record = service.register("Fresh_Face", None).await.unwrap();
        assert_eq!(record.username, "fresh_face");
        assert_eq!(record.shard, 6);

        let result = service.check_availability("fresh_face").await;
        assert!(!result.available);

        let err = service.register("FRESH_FACE", None).await.unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn test_ensure_registrable() {
        let service = service_with(&["alice123"]).await;
        assert_eq!(service.ensure_registrable("New_Person").await.unwrap(), "new_person");
        assert!(matches!(
            service.ensure_registrable("ALICE123").await,
            Err(AppError::UsernameTaken(_))
        ));
        assert!(matches!(
            service.ensure_registrable("ab").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid() {
        let service = service_with(&[]).await;
        let err = service.register("9alice", None).await.unwrap_err();
        match err {
            AppError::InvalidInput(issues) => {
                assert_eq!(issues, vec!["Username must start with a letter"]);
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_random_username() {
        let service = service_with(&["alice123"]).await;
        let name = service.generate_random_username().await.unwrap();
        assert!(UsernamePolicy::is_valid(&name));
        assert!(service.check_availability(&name).await.available);
    }

    #[tokio::test]
    async fn test_random_username_exhaustion() {
        let store = Arc::new(DownStore {
            calls: AtomicUsize::new(0),
        });
        // a saturated filter reports every name as possibly present
        let filter = Arc::new(BloomFilter::new(1, 1));
        filter.insert("anything");
        let service = UsernameAvailabilityService::new(store, filter, options());

        let err = service.generate_random_username().await.unwrap_err();
        assert!(matches!(err, AppError::SuggestionExhausted { attempts: 10 }));

        // suggestions degrade to an empty list instead of an error
        assert!(service.suggest("alice123").await.is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_respect_count() {
        let service = service_with(&["bobby_tables"]).await;
        let suggestions = service
            .suggest_with("bobby_tables", StdRng::seed_from_u64(11))
            .await;
        assert_eq!(suggestions.len(), service.options().suggestion_count);

        let mut unique = suggestions.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), suggestions.len());
    }
}
