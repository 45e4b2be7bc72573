//! Login workflow.

use tracing::info;

use super::error::AuthError;
use super::models::Account;
use super::token::TokenPair;
use super::{normalize_identifier, password, store, AuthService};

impl AuthService {
    /// Authenticate a username/password pair and issue an access+refresh
    /// pair. A missing account, a missing stored hash, and a wrong password
    /// all read as `InvalidCredentials`; the verification state of the
    /// account is only consulted once the password has checked out, so a
    /// failed login never reveals it.
    pub async fn login(
        &self,
        username: &str,
        password_input: &str,
    ) -> Result<(Account, TokenPair), AuthError> {
        let username = normalize_identifier(username);

        let account = store::fetch_account_by_username(&self.pool, &username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let Some(stored_hash) = account.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify(password_input, stored_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let pair = self.issuer.issue_pair(account.id)?;
        info!(username = %account.username, "account logged in");
        Ok((account, pair))
    }
}
