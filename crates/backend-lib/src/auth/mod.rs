// ============================
// identity-backend/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod password;

pub use password::{HasherConfig, PasswordHasher};
