//! Username-change workflow.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::error::AuthError;
use super::models::Account;
use super::{normalize_identifier, store, AuthService};

impl AuthService {
    /// Rename the account. Uniqueness only applies among live accounts;
    /// submitting the current name is a no-op.
    pub async fn change_username(
        &self,
        account_id: Uuid,
        username: &str,
    ) -> Result<Account, AuthError> {
        let username = normalize_identifier(username);

        let mut account = store::fetch_account_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if let Some(existing) = store::fetch_account_by_username(&self.pool, &username).await? {
            if existing.id != account.id {
                return Err(AuthError::UsernameExists);
            }
        }
        if account.username == username {
            return Ok(account);
        }

        let now = Utc::now();
        store::update_username(&self.pool, account.id, &username, now).await?;

        account.username = username;
        account.updated_at = now;
        info!(%account_id, username = %account.username, "username changed");
        Ok(account)
    }
}
