//! Delivery collaborator for verification codes.
//!
//! The subsystem only knows "send code C to address E"; transport and
//! template rendering live behind [`MailTransport`]. Every failure mode,
//! including a hung transport past the configured per-call timeout,
//! collapses into [`AuthError::DeliveryFailed`] for the caller.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

use super::error::AuthError;

/// Outbound delivery abstraction.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver a verification code or return an error.
    async fn send_code(&self, email: &str, code: &str) -> Result<()>;
}

/// Local dev transport that logs instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        info!(to_email = %email, code = %code, "verification code send stub");
        Ok(())
    }
}

/// Send a code with the per-call timeout applied, mapping failure and
/// timeout alike to `DeliveryFailed`.
pub(crate) async fn deliver_code(
    mailer: &dyn MailTransport,
    timeout: Duration,
    email: &str,
    code: &str,
) -> Result<(), AuthError> {
    match tokio::time::timeout(timeout, mailer.send_code(email, code)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(to_email = %email, "failed to deliver verification code: {err}");
            Err(AuthError::DeliveryFailed)
        }
        Err(_) => {
            error!(to_email = %email, "verification code delivery timed out");
            Err(AuthError::DeliveryFailed)
        }
    }
}
