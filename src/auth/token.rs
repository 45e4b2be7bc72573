//! Signed bearer tokens for registered and anonymous sessions.
//!
//! Three token kinds share one claim shape: `{sub, type, jti, iat, exp}`,
//! signed HS256 with a shared secret. Tokens are never persisted and there
//! is no server-side revocation list; the caller holds the token and the
//! server only validates what it is handed.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{
    errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Discriminates the three credential kinds inside one claim shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Anon,
}

/// The claim set carried by every issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// An access/refresh pair issued together on login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Decode failures, split into the two kinds the caller can act on.
/// Bad signature, malformed structure, and wrong algorithm all read as
/// `Invalid`; only a structurally valid token past its `exp` is `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

/// Issues and validates tokens with one shared HS256 secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    anon_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        secret: &SecretString,
        access_ttl: Duration,
        refresh_ttl: Duration,
        anon_ttl: Duration,
    ) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
            anon_ttl,
        }
    }

    /// Issue an access+refresh pair for a subject, each with its own expiry
    /// and unique id.
    pub fn issue_pair(&self, subject: Uuid) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(subject, TokenKind::Access, self.access_ttl)?,
            refresh: self.issue(subject, TokenKind::Refresh, self.refresh_ttl)?,
        })
    }

    /// Issue an anon-kind token for a not-yet-registered visitor.
    pub fn issue_anonymous(&self, subject: Uuid) -> Result<String> {
        self.issue(subject, TokenKind::Anon, self.anon_ttl)
    }

    fn issue(&self, subject: Uuid, kind: TokenKind, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .context("failed to sign token")
    }

    /// Decode and validate a raw token, tolerating surrounding whitespace.
    pub fn decode(&self, raw: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<Claims>(raw.trim(), &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
