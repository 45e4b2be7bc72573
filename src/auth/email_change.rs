//! Email-change workflow.
//!
//! A new address becomes `pending_email` and has to be confirmed through
//! the verification workflow before it replaces the primary one. Like
//! resend, delivery runs after the transaction commits.

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::models::Account;
use super::{code, code_expiry, mailer, normalize_identifier, store, AuthService};

impl AuthService {
    /// Stage an email change for the account: record the pending address,
    /// create a verification code, and deliver it to the new address.
    /// Re-requesting the current verified address is a no-op.
    pub async fn change_email(
        &self,
        account_id: Uuid,
        email: &str,
    ) -> Result<Account, AuthError> {
        let email = normalize_identifier(email);

        let mut account = store::fetch_account_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if let Some(existing) = store::fetch_account_claiming_email(&self.pool, &email).await? {
            if existing.id != account.id {
                return Err(AuthError::EmailExists);
            }
        }
        if account.email == email && account.is_verified {
            return Ok(account);
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin email change transaction")?;

        store::set_pending_email(&mut tx, account.id, &email, now).await?;
        let code_value = code::generate(self.config.code_length())?;
        let row = store::insert_code(
            &mut tx,
            account.id,
            &code_value,
            code_expiry(now, self.config.code_ttl()),
        )
        .await?;

        tx.commit()
            .await
            .context("failed to commit email change transaction")?;

        // The pending address and its code are durable; delivery failure
        // leaves them usable by a later resend.
        mailer::deliver_code(
            self.mailer.as_ref(),
            self.config.mail_timeout(),
            &email,
            &code_value,
        )
        .await?;

        if let Err(err) = store::touch_code_last_sent(&self.pool, row.id, Utc::now()).await {
            warn!("failed to record verification code send time: {err}");
        }

        account.pending_email = Some(email.clone());
        account.updated_at = now;
        info!(%account_id, email = %email, "email change staged");
        Ok(account)
    }
}
