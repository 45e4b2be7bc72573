//! Row models for accounts and verification codes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// A registered identity. The soft-delete marker stays inside the storage
/// gateway; a loaded `Account` is always a live row.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub pending_email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            pending_email: row.try_get("pending_email")?,
            password_hash: row.try_get("password_hash")?,
            is_verified: row.try_get("is_verified")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One verification code row. Rows are history: they accumulate per account
/// and are never deleted, only marked used.
#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub id: Uuid,
    pub account_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for VerificationCode {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            code: row.try_get("code")?,
            expires_at: row.try_get("expires_at")?,
            used_at: row.try_get("used_at")?,
            attempts: row.try_get("attempts")?,
            last_sent_at: row.try_get("last_sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl VerificationCode {
    /// The cooldown clock starts from the last delivery, falling back to
    /// row creation when the code has never been (re)sent.
    #[must_use]
    pub fn cooldown_base(&self) -> DateTime<Utc> {
        self.last_sent_at.unwrap_or(self.created_at)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Fields persisted when creating an account at registration.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
