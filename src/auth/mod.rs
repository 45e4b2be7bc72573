//! Session credentials and email verification.
//!
//! The subsystem issues and validates bearer tokens for registered and
//! anonymous visitors and manages time-boxed email verification codes with
//! abuse controls (resend cooldown, attempt limiting). The HTTP layer,
//! storage engine, and mail transport stay outside: workflows receive
//! already-normalized strings, talk to Postgres through the gateway in
//! [`store`], and hand delivery to a [`mailer::MailTransport`].

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

pub mod code;
pub mod error;
pub mod mailer;
pub mod models;
pub mod password;
pub mod token;

pub(crate) mod store;

mod anonymous;
mod email_change;
mod login;
mod refresh;
mod register;
mod resend;
mod session;
mod username_change;
mod verify;

pub use error::AuthError;
pub use mailer::{LogMailer, MailTransport};
pub use resend::ResendOutcome;
pub use session::SessionState;
pub use token::{Claims, TokenError, TokenIssuer, TokenKind, TokenPair};

/// Tunables for the auth workflows. Built with defaults and adjusted
/// through the `with_*` methods; `normalize` clamps nonsense values.
#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    code_length: usize,
    code_ttl: Duration,
    max_attempts: i32,
    resend_cooldown: Duration,
    bcrypt_cost: u32,
    mail_timeout: Duration,
}

impl AuthConfig {
    /// Default config: 6-digit codes valid 15 minutes, 6 attempts,
    /// 60 s resend cooldown, bcrypt cost 12, 10 s delivery timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_length: code::DEFAULT_CODE_LENGTH,
            code_ttl: Duration::from_secs(15 * 60),
            max_attempts: 6,
            resend_cooldown: Duration::from_secs(60),
            bcrypt_cost: 12,
            mail_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.code_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: u64) -> Self {
        self.resend_cooldown = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_mail_timeout_seconds(mut self, seconds: u64) -> Self {
        self.mail_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            code_length: self.code_length.max(1),
            code_ttl: if self.code_ttl.is_zero() {
                Duration::from_secs(60)
            } else {
                self.code_ttl
            },
            max_attempts: self.max_attempts.max(1),
            resend_cooldown: self.resend_cooldown,
            bcrypt_cost: self.bcrypt_cost.clamp(4, 31),
            mail_timeout: if self.mail_timeout.is_zero() {
                Duration::from_secs(1)
            } else {
                self.mail_timeout
            },
        }
    }

    #[must_use]
    pub fn code_length(&self) -> usize {
        self.code_length
    }

    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> Duration {
        self.resend_cooldown
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn mail_timeout(&self) -> Duration {
        self.mail_timeout
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The subsystem's entry point: one explicitly constructed value holding
/// the pool, token issuer, mail transport, and config, built once at
/// process start and passed down. No globals.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    issuer: Arc<TokenIssuer>,
    mailer: Arc<dyn MailTransport>,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        pool: PgPool,
        issuer: TokenIssuer,
        mailer: Arc<dyn MailTransport>,
        config: AuthConfig,
    ) -> Self {
        Self {
            pool,
            issuer: Arc::new(issuer),
            mailer,
            config: config.normalize(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

/// Lowercase-and-trim normalization shared by every workflow that takes a
/// username or email. Password strings pass through untouched.
pub(crate) fn normalize_identifier(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Expiry for a fresh code row, saturating instead of overflowing on
/// absurd TTLs.
pub(crate) fn code_expiry(
    now: chrono::DateTime<chrono::Utc>,
    ttl: Duration,
) -> chrono::DateTime<chrono::Utc> {
    chrono::TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}
