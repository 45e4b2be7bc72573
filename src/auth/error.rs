//! Typed error taxonomy for the auth subsystem.
//!
//! Every workflow returns one of these kinds; the API layer maps a kind to a
//! wire status through [`AuthError::status`] and nothing else. Expected
//! domain failures propagate unchanged; only unexpected errors are wrapped
//! into [`AuthError::Service`].

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No matching non-deleted account.
    #[error("account not found")]
    NotFound,
    /// Username already taken by a non-deleted account.
    #[error("username already exists")]
    UsernameExists,
    /// Email already taken by a non-deleted account.
    #[error("email already exists")]
    EmailExists,
    /// The account's email is already confirmed.
    #[error("email already verified")]
    AlreadyVerified,
    /// No usable code row, or the submitted code does not match.
    #[error("verification code invalid")]
    CodeInvalid,
    /// The code row exists but its expiry is in the past.
    #[error("verification code expired")]
    CodeExpired,
    /// Resend cooldown still running, or the attempt budget is exhausted.
    #[error("too many attempts")]
    RateLimited,
    /// Unknown username, missing stored hash, or password mismatch.
    /// One kind for all three so failed logins reveal nothing.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Credentials are correct but the email was never confirmed.
    #[error("email not verified")]
    EmailNotVerified,
    /// Bad signature, malformed structure, wrong algorithm or claim shape.
    #[error("token invalid")]
    TokenInvalid,
    /// Structurally valid token past its `exp`.
    #[error("token expired")]
    TokenExpired,
    /// The delivery collaborator failed or timed out.
    #[error("email delivery failed")]
    DeliveryFailed,
    /// Catch-all for unexpected failures; always rolls back open writes.
    #[error("auth service error")]
    Service(#[from] anyhow::Error),
}

impl AuthError {
    /// The one kind-to-status table for the surrounding API layer.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound
            | Self::InvalidCredentials
            | Self::TokenInvalid
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::UsernameExists | Self::EmailExists => StatusCode::CONFLICT,
            Self::AlreadyVerified
            | Self::CodeInvalid
            | Self::CodeExpired
            | Self::RateLimited => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DeliveryFailed | Self::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Service(anyhow::Error::new(err).context("database error"))
    }
}

impl From<super::token::TokenError> for AuthError {
    fn from(err: super::token::TokenError) -> Self {
        match err {
            super::token::TokenError::Expired => Self::TokenExpired,
            super::token::TokenError::Invalid => Self::TokenInvalid,
        }
    }
}
