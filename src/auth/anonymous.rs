//! Anonymous session workflow.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use tracing::info;
use uuid::Uuid;

use super::error::AuthError;
use super::AuthService;

/// Draw an anonymous identifier from the OS RNG.
fn generate_anon_id() -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("random source unavailable")?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

impl AuthService {
    /// Mint an identifier for a not-yet-registered visitor and bind an
    /// anon-kind token to it. Id generation and signing fail with distinct
    /// messages so the two stages stay tellable apart in logs.
    pub async fn anonymous_session(&self) -> Result<(Uuid, String), AuthError> {
        let anon_id = generate_anon_id()
            .map_err(|err| AuthError::Service(err.context("failed to generate anonymous session id")))?;

        let token = self
            .issuer
            .issue_anonymous(anon_id)
            .map_err(|err| AuthError::Service(err.context("failed to create anonymous session token")))?;

        info!(%anon_id, "anonymous session created");
        Ok((anon_id, token))
    }
}
