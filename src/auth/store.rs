//! Storage gateway for accounts and verification codes.
//!
//! Every query against `accounts` carries the `deleted_at IS NULL` predicate
//! here and nowhere else; workflows never observe soft-deleted rows. Code
//! rows are append-only history: they are inserted and updated, never
//! deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{Account, NewAccount, VerificationCode};

type PgTx<'t> = sqlx::Transaction<'t, sqlx::Postgres>;

/// Username/email owned by an existing live account, used to report
/// registration collisions per field.
#[derive(Debug)]
pub(crate) struct IdentityConflict {
    pub(crate) username: String,
    pub(crate) email: String,
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) async fn fetch_account_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<Account>> {
    let query = r"
        SELECT id, username, email, pending_email, password_hash, is_verified,
               created_at, updated_at
        FROM accounts
        WHERE username = $1
          AND deleted_at IS NULL
        LIMIT 1
    ";
    sqlx::query_as::<_, Account>(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch account by username")
}

pub(crate) async fn fetch_account_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>> {
    let query = r"
        SELECT id, username, email, pending_email, password_hash, is_verified,
               created_at, updated_at
        FROM accounts
        WHERE id = $1
          AND deleted_at IS NULL
        LIMIT 1
    ";
    sqlx::query_as::<_, Account>(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch account by id")
}

/// Live account claiming the address as primary or pending email.
/// Used for email-change uniqueness checks.
pub(crate) async fn fetch_account_claiming_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Account>> {
    let query = r"
        SELECT id, username, email, pending_email, password_hash, is_verified,
               created_at, updated_at
        FROM accounts
        WHERE (email = $1 OR pending_email = $1)
          AND deleted_at IS NULL
        LIMIT 1
    ";
    sqlx::query_as::<_, Account>(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch account claiming email")
}

/// Same lookup inside an open transaction, for the resend and verification
/// workflows which read and write under one atomicity unit.
pub(crate) async fn fetch_account_by_email_or_pending(
    tx: &mut PgTx<'_>,
    email: &str,
) -> Result<Option<Account>> {
    let query = r"
        SELECT id, username, email, pending_email, password_hash, is_verified,
               created_at, updated_at
        FROM accounts
        WHERE (email = $1 OR pending_email = $1)
          AND deleted_at IS NULL
        LIMIT 1
    ";
    sqlx::query_as::<_, Account>(query)
        .bind(email)
        .fetch_optional(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch account by email or pending email")
}

/// Live accounts colliding with the given username or email, for the
/// registration uniqueness check.
pub(crate) async fn conflicting_identities(
    tx: &mut PgTx<'_>,
    username: &str,
    email: &str,
) -> Result<Vec<IdentityConflict>> {
    let query = r"
        SELECT username, email
        FROM accounts
        WHERE (username = $1 OR email = $2)
          AND deleted_at IS NULL
    ";
    let rows = sqlx::query(query)
        .bind(username)
        .bind(email)
        .fetch_all(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to check username and email uniqueness")?;

    Ok(rows
        .into_iter()
        .map(|row| IdentityConflict {
            username: row.get("username"),
            email: row.get("email"),
        })
        .collect())
}

pub(crate) async fn insert_account(tx: &mut PgTx<'_>, new: &NewAccount) -> Result<Account> {
    let query = r"
        INSERT INTO accounts (username, email, password_hash, is_verified)
        VALUES ($1, $2, $3, FALSE)
        RETURNING id, username, email, pending_email, password_hash, is_verified,
                  created_at, updated_at
    ";
    sqlx::query_as::<_, Account>(query)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert account")
}

pub(crate) async fn insert_code(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
    code: &str,
    expires_at: DateTime<Utc>,
) -> Result<VerificationCode> {
    let query = r"
        INSERT INTO verification_codes (account_id, code, expires_at)
        VALUES ($1, $2, $3)
        RETURNING id, account_id, code, expires_at, used_at, attempts,
                  last_sent_at, created_at
    ";
    sqlx::query_as::<_, VerificationCode>(query)
        .bind(account_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert verification code")
}

/// Most recent code row for the account regardless of used state; the
/// verification workflow inspects used/exhausted rows itself.
pub(crate) async fn fetch_latest_code(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
) -> Result<Option<VerificationCode>> {
    let query = r"
        SELECT id, account_id, code, expires_at, used_at, attempts,
               last_sent_at, created_at
        FROM verification_codes
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT 1
    ";
    sqlx::query_as::<_, VerificationCode>(query)
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch latest verification code")
}

/// Most recent not-yet-used code row, for the resend decision table.
pub(crate) async fn fetch_latest_unused_code(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
) -> Result<Option<VerificationCode>> {
    let query = r"
        SELECT id, account_id, code, expires_at, used_at, attempts,
               last_sent_at, created_at
        FROM verification_codes
        WHERE account_id = $1
          AND used_at IS NULL
        ORDER BY created_at DESC
        LIMIT 1
    ";
    sqlx::query_as::<_, VerificationCode>(query)
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to fetch latest unused verification code")
}

pub(crate) async fn mark_code_used(
    tx: &mut PgTx<'_>,
    code_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    let query = "UPDATE verification_codes SET used_at = $2 WHERE id = $1";
    sqlx::query(query)
        .bind(code_id)
        .bind(at)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to mark verification code used")?;
    Ok(())
}

/// Write back an attempts value computed by the caller, optionally marking
/// the row used in the same statement. Read-modify-write on purpose: two
/// concurrent attempts may under-count, which the subsystem accepts.
pub(crate) async fn set_code_attempts(
    tx: &mut PgTx<'_>,
    code_id: Uuid,
    attempts: i32,
    used_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let query = r"
        UPDATE verification_codes
        SET attempts = $2,
            used_at = COALESCE($3, used_at)
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(code_id)
        .bind(attempts)
        .bind(used_at)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update verification code attempts")?;
    Ok(())
}

/// Record a successful delivery for future cooldown math. Pool-based on
/// purpose: the caller invokes this best-effort after its transaction
/// committed and the mail went out.
pub(crate) async fn touch_code_last_sent(
    pool: &PgPool,
    code_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    let query = "UPDATE verification_codes SET last_sent_at = $2 WHERE id = $1";
    sqlx::query(query)
        .bind(code_id)
        .bind(at)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update verification code last_sent_at")?;
    Ok(())
}

/// Finish a successful verification: consume the code row and flip the
/// account to verified, promoting a matched pending email into the primary
/// slot. Both writes share the caller's transaction.
pub(crate) async fn apply_verification(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
    code_id: Uuid,
    promote_email: Option<&str>,
    at: DateTime<Utc>,
) -> Result<()> {
    mark_code_used(tx, code_id, at).await?;

    let query = r"
        UPDATE accounts
        SET is_verified = TRUE,
            email = COALESCE($2, email),
            pending_email = CASE WHEN $2 IS NULL THEN pending_email ELSE NULL END,
            updated_at = $3
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(promote_email)
        .bind(at)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to mark account verified")?;
    Ok(())
}

pub(crate) async fn set_pending_email(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
    email: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET pending_email = $2,
            updated_at = $3
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(email)
        .bind(at)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to set pending email")?;
    Ok(())
}

pub(crate) async fn update_username(
    pool: &PgPool,
    account_id: Uuid,
    username: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET username = $2,
            updated_at = $3
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(username)
        .bind(at)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update username")?;
    Ok(())
}
