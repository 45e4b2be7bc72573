use crate::api;
use crate::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;
use std::time::Duration;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            secret,
            access_ttl_seconds,
            refresh_ttl_seconds,
            anon_ttl_seconds,
            code_ttl_seconds,
            max_attempts,
            resend_cooldown_seconds,
        } => {
            let auth_config = AuthConfig::new()
                .with_code_ttl_seconds(code_ttl_seconds)
                .with_max_attempts(max_attempts)
                .with_resend_cooldown_seconds(resend_cooldown_seconds);

            api::new(
                port,
                dsn,
                secret,
                Duration::from_secs(access_ttl_seconds),
                Duration::from_secs(refresh_ttl_seconds),
                Duration::from_secs(anon_ttl_seconds),
                auth_config,
            )
            .await?;
        }
    }

    Ok(())
}
