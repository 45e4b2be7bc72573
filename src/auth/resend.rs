//! Resend workflow for verification codes.
//!
//! Selecting or creating the code row is one transaction; delivery runs
//! after commit so a failed send never undoes a persisted code, and a
//! retried resend can still deliver it.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::models::VerificationCode;
use super::{code, code_expiry, mailer, normalize_identifier, store, AuthService};

/// What a successful resend did with the code row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    /// A fresh code row was created (no unused row, or the last one was
    /// expired or exhausted).
    Created,
    /// The existing unused code value was delivered again.
    Reused,
}

/// Decision table over the most recent unused code row.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ResendDecision {
    CreateNew,
    Reuse { code_id: Uuid, code: String },
    RateLimited,
}

/// Pick what a resend should do. An expired row counts as absent, matching
/// the "active code" lookup the rest of the subsystem uses; an exhausted
/// row is never reused.
pub(crate) fn decide_resend(
    latest_unused: Option<&VerificationCode>,
    now: DateTime<Utc>,
    cooldown: Duration,
    max_attempts: i32,
) -> ResendDecision {
    let Some(row) = latest_unused else {
        return ResendDecision::CreateNew;
    };
    if row.is_expired(now) || row.attempts >= max_attempts {
        return ResendDecision::CreateNew;
    }

    let cooldown = chrono::TimeDelta::from_std(cooldown).unwrap_or(chrono::TimeDelta::MAX);
    let cooldown_until = row
        .cooldown_base()
        .checked_add_signed(cooldown)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now < cooldown_until {
        return ResendDecision::RateLimited;
    }

    ResendDecision::Reuse {
        code_id: row.id,
        code: row.code.clone(),
    }
}

impl AuthService {
    /// Resend a verification code to a primary or pending email address.
    pub async fn resend_code(&self, email: &str) -> Result<ResendOutcome, AuthError> {
        let email = normalize_identifier(email);
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin resend transaction")?;

        let account = store::fetch_account_by_email_or_pending(&mut tx, &email)
            .await?
            .ok_or(AuthError::NotFound)?;
        if account.is_verified && account.pending_email.as_deref() != Some(email.as_str()) {
            let _ = tx.rollback().await;
            return Err(AuthError::AlreadyVerified);
        }

        let latest = store::fetch_latest_unused_code(&mut tx, account.id).await?;
        let decision = decide_resend(
            latest.as_ref(),
            now,
            self.config.resend_cooldown(),
            self.config.max_attempts(),
        );
        let (outcome, code_id, code_value) = match decision {
            ResendDecision::RateLimited => {
                let _ = tx.rollback().await;
                return Err(AuthError::RateLimited);
            }
            ResendDecision::Reuse { code_id, code } => (ResendOutcome::Reused, code_id, code),
            ResendDecision::CreateNew => {
                let value = code::generate(self.config.code_length())?;
                let row = store::insert_code(
                    &mut tx,
                    account.id,
                    &value,
                    code_expiry(now, self.config.code_ttl()),
                )
                .await?;
                (ResendOutcome::Created, row.id, value)
            }
        };

        tx.commit()
            .await
            .context("failed to commit resend transaction")?;

        // Past this point the code row is durable; a delivery failure is an
        // email-stage error and must not undo it.
        mailer::deliver_code(
            self.mailer.as_ref(),
            self.config.mail_timeout(),
            &email,
            &code_value,
        )
        .await?;

        // Best-effort; only future cooldown math depends on it.
        if let Err(err) = store::touch_code_last_sent(&self.pool, code_id, Utc::now()).await {
            warn!("failed to record verification code send time: {err}");
        }

        info!(email = %email, ?outcome, "verification code resent");
        Ok(outcome)
    }
}
