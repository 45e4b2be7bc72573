//! Session resolution.
//!
//! Works out who a request belongs to from an optional access token and an
//! optional anon token. Expected failures (invalid, expired, unknown
//! account) are swallowed so resolution can fall through; only unexpected
//! storage failures escape.

use uuid::Uuid;

use super::error::AuthError;
use super::token::TokenKind;
use super::{store, AuthService};

/// The three ways a request can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A valid access token for an existing, non-deleted account.
    Authenticated(Uuid),
    /// No usable access token, but a valid anon token.
    Anonymous(Uuid),
    /// Neither token usable or present.
    None,
}

impl AuthService {
    /// Resolve the current session. A valid access token always outranks a
    /// simultaneously valid anon token.
    pub async fn resolve_session(
        &self,
        access_token: Option<&str>,
        anon_token: Option<&str>,
    ) -> Result<SessionState, AuthError> {
        if let Some(raw) = access_token {
            if let Some(account_id) = self.authenticated_subject(raw).await? {
                return Ok(SessionState::Authenticated(account_id));
            }
        }

        if let Some(raw) = anon_token {
            if let Some(anon_id) = self.anonymous_subject(raw) {
                return Ok(SessionState::Anonymous(anon_id));
            }
        }

        Ok(SessionState::None)
    }

    /// Access path: decode, require the access kind and a UUID subject,
    /// then confirm the account still exists. Every expected failure is
    /// `None`; the storage error is the one thing allowed to surface.
    async fn authenticated_subject(&self, raw: &str) -> Result<Option<Uuid>, AuthError> {
        let Ok(claims) = self.issuer.decode(raw) else {
            return Ok(None);
        };
        if claims.kind != TokenKind::Access {
            return Ok(None);
        }
        let Ok(account_id) = Uuid::parse_str(&claims.sub) else {
            return Ok(None);
        };
        let account = store::fetch_account_by_id(&self.pool, account_id).await?;
        Ok(account.map(|account| account.id))
    }

    fn anonymous_subject(&self, raw: &str) -> Option<Uuid> {
        let claims = self.issuer.decode(raw).ok()?;
        if claims.kind != TokenKind::Anon {
            return None;
        }
        Uuid::parse_str(&claims.sub).ok()
    }
}
