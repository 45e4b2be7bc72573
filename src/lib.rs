//! # Atesti (Session Credentials & Email Verification)
//!
//! `atesti` issues and validates session credentials for registered and
//! anonymous visitors, and manages time-boxed email verification codes with
//! abuse controls.
//!
//! ## Credentials
//!
//! Three bearer token kinds share one HS256-signed claim shape
//! (`sub`, `type`, `jti`, `iat`, `exp`): `access` and `refresh` tokens for
//! registered accounts, and `anon` tokens for visitors without a password.
//! Tokens are never persisted and there is no revocation list; a refresh
//! simply supersedes the old pair by caller convention.
//!
//! ## Email verification
//!
//! Registration, resend, and email-change create short numeric codes that
//! prove control of an address:
//!
//! - **Cooldown:** consecutive deliveries of a code are spaced by a
//!   configurable interval, counted from the last send (or row creation).
//! - **Attempt limiting:** after too many wrong guesses a code row is
//!   invalidated even without a correct guess, and the caller sees a
//!   rate-limit failure rather than a hint that the code was wrong.
//! - **Pending email:** an address change stays in `pending_email` until a
//!   code sent to the new address confirms it.
//!
//! ## Soft deletes
//!
//! Accounts are never physically removed. The storage gateway filters
//! deleted rows on every query, so workflows only ever see live accounts,
//! and username/email uniqueness applies to live accounts only.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
