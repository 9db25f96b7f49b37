// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const AVAILABILITY_CHECK: &str = "username.availability.check";
pub const FILTER_NEGATIVE: &str = "username.filter.negative";
pub const FILTER_FALSE_POSITIVE: &str = "username.filter.false_positive";
pub const STORE_FALLBACK_FAILED: &str = "username.store.fallback_failed";
pub const SUGGESTIONS_EXHAUSTED: &str = "username.suggestions.exhausted";
pub const USER_REGISTERED: &str = "user.registered";
pub const FILTER_REBUILD: &str = "username.filter.rebuild";
pub const FILTER_REBUILD_FAILED: &str = "username.filter.rebuild_failed";
pub const FILTER_ITEMS: &str = "username.filter.items";
pub const FILTER_FILL_RATIO: &str = "username.filter.fill_ratio";
