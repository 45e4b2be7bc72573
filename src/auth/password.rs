//! Password hashing on top of bcrypt.
//!
//! The cost factor comes from [`super::AuthConfig`]; hashing is the only
//! fallible half. Verification never fails: a malformed stored hash or any
//! internal bcrypt error reads as a mismatch.

use anyhow::{Context, Result};

/// Hash a password with the given bcrypt cost factor.
pub fn hash(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("failed to hash password")
}

/// Check a password against a stored hash. Any internal failure,
/// including an unparseable hash, yields `false`.
#[must_use]
pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
