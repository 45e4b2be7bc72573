//! Refresh workflow.
//!
//! Rotation is full replacement: the old refresh token is not blacklisted,
//! only superseded by caller convention.

use tracing::info;
use uuid::Uuid;

use super::error::AuthError;
use super::token::{TokenKind, TokenPair};
use super::{store, AuthService};

impl AuthService {
    /// Exchange a refresh token for a brand-new access+refresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.decode(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::TokenInvalid);
        }
        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::TokenInvalid)?;

        store::fetch_account_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let pair = self.issuer.issue_pair(account_id)?;
        info!(%account_id, "token pair refreshed");
        Ok(pair)
    }
}
