//! Registration workflow.
//!
//! Creates an unverified account, its first verification code, and requests
//! delivery, all inside one transaction. A failed send rolls the whole
//! unit back so no orphaned unverified account survives it.

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use super::error::AuthError;
use super::models::{Account, NewAccount};
use super::{code, code_expiry, mailer, normalize_identifier, password, store, AuthService};

impl AuthService {
    /// Register a new account. Inputs arrive pre-validated from the API
    /// layer; this normalizes, checks uniqueness among live accounts
    /// (username collision wins over email collision), persists the account
    /// plus a verification code, and requests delivery before committing.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, AuthError> {
        let username = normalize_identifier(username);
        let email = normalize_identifier(email);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin registration transaction")?;

        let conflicts = store::conflicting_identities(&mut tx, &username, &email).await?;
        if conflicts.iter().any(|c| c.username == username) {
            let _ = tx.rollback().await;
            return Err(AuthError::UsernameExists);
        }
        if conflicts.iter().any(|c| c.email == email) {
            let _ = tx.rollback().await;
            return Err(AuthError::EmailExists);
        }

        let password_hash = password::hash(password, self.config.bcrypt_cost())?;
        let account = store::insert_account(
            &mut tx,
            &NewAccount {
                username,
                email,
                password_hash,
            },
        )
        .await?;

        let now = Utc::now();
        let code_value = code::generate(self.config.code_length())?;
        store::insert_code(
            &mut tx,
            account.id,
            &code_value,
            code_expiry(now, self.config.code_ttl()),
        )
        .await?;

        // Delivery runs while the transaction is still open; failure undoes
        // the account and the code together.
        if let Err(err) = mailer::deliver_code(
            self.mailer.as_ref(),
            self.config.mail_timeout(),
            &account.email,
            &code_value,
        )
        .await
        {
            let _ = tx.rollback().await;
            return Err(err);
        }

        tx.commit()
            .await
            .context("failed to commit registration transaction")?;

        info!(username = %account.username, email = %account.email, "account registered");
        Ok(account)
    }
}
