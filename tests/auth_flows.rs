//! End-to-end auth flows against a scratch Postgres database.
//!
//! These tests are skipped unless `ATESTI_TEST_DSN` points at a database
//! the suite may write to. Migrations are applied on first connect; every
//! test registers its own throwaway identities so runs are repeatable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use atesti::auth::{
    AuthConfig, AuthError, AuthService, MailTransport, ResendOutcome, SessionState, TokenIssuer,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const MAX_ATTEMPTS: i32 = 6;

/// Captures outbound codes and can be switched into failure mode.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .last()
            .map(|(_, code)| code.clone())
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().expect("mailer mutex poisoned").len()
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("smtp unavailable"));
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("ATESTI_TEST_DSN") else {
        eprintln!("ATESTI_TEST_DSN not set; skipping database test");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Some(pool))
}

fn service_with(
    pool: PgPool,
    mailer: Arc<RecordingMailer>,
    cooldown_seconds: u64,
) -> AuthService {
    let issuer = TokenIssuer::new(
        &SecretString::from("integration-secret"),
        Duration::from_secs(900),
        Duration::from_secs(3600),
        Duration::from_secs(1800),
    );
    let config = AuthConfig::new()
        .with_bcrypt_cost(4)
        .with_max_attempts(MAX_ATTEMPTS)
        .with_resend_cooldown_seconds(cooldown_seconds);
    AuthService::new(pool, issuer, mailer, config)
}

/// Fresh username/email per test so reruns never collide.
fn identity(tag: &str) -> (String, String) {
    let nonce = Uuid::new_v4().simple().to_string();
    (
        format!("{tag}_{}", &nonce[..12]),
        format!("{tag}_{}@example.com", &nonce[..12]),
    )
}

async fn code_row_count(pool: &PgPool, account_id: Uuid) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM verification_codes WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

async fn latest_code_state(pool: &PgPool, account_id: Uuid) -> Result<(bool, i32)> {
    let row = sqlx::query(
        r"
        SELECT used_at IS NOT NULL AS used, attempts
        FROM verification_codes
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        ",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;
    Ok((row.get("used"), row.get("attempts")))
}

#[tokio::test]
async fn register_resend_and_exhaustion_end_to_end() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool.clone(), mailer.clone(), 60);
    let (username, email) = identity("alice");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    assert!(!account.is_verified);
    assert_eq!(code_row_count(&pool, account.id).await?, 1);
    assert_eq!(latest_code_state(&pool, account.id).await?, (false, 0));

    // Immediately after registration the cooldown (counted from row
    // creation) is still running.
    let resend = service.resend_code(&email).await;
    assert!(matches!(resend, Err(AuthError::RateLimited)));
    assert_eq!(code_row_count(&pool, account.id).await?, 1);

    // Six wrong guesses: five read as invalid, the sixth spends the budget.
    for attempt in 1..=MAX_ATTEMPTS {
        let result = service.verify_email(&email, "999999").await;
        if attempt < MAX_ATTEMPTS {
            assert!(matches!(result, Err(AuthError::CodeInvalid)));
        } else {
            assert!(matches!(result, Err(AuthError::RateLimited)));
        }
    }
    assert_eq!(
        latest_code_state(&pool, account.id).await?,
        (true, MAX_ATTEMPTS)
    );

    // The exhausted row is never reused; a resend mints a second one.
    let resend = service.resend_code(&email).await?;
    assert_eq!(resend, ResendOutcome::Created);
    assert_eq!(code_row_count(&pool, account.id).await?, 2);

    // The freshly delivered code still verifies the account.
    let code = mailer.last_code().expect("resend delivered a code");
    service.verify_email(&email, &code).await?;
    let verified = service.login(&username, "Passw0rd1").await?;
    assert!(verified.0.is_verified);
    Ok(())
}

#[tokio::test]
async fn duplicate_username_reported_before_duplicate_email() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer, 60);
    let (username, email) = identity("bob");
    service.register(&username, &email, "Passw0rd1").await?;

    let (_, other_email) = identity("bob2");
    let result = service.register(&username, &other_email, "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::UsernameExists)));

    let (other_username, _) = identity("bob3");
    let result = service.register(&other_username, &email, "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::EmailExists)));

    // Username wins when both collide.
    let result = service.register(&username, &email, "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::UsernameExists)));
    Ok(())
}

#[tokio::test]
async fn failed_delivery_rolls_back_registration() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    mailer.set_fail(true);
    let service = service_with(pool.clone(), mailer.clone(), 60);
    let (username, email) = identity("carol");

    let result = service.register(&username, &email, "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::DeliveryFailed)));

    // No orphaned unverified account may survive a failed send.
    let row = sqlx::query("SELECT COUNT(*) AS n FROM accounts WHERE username = $1")
        .bind(&username)
        .fetch_one(&pool)
        .await?;
    let count: i64 = row.get("n");
    assert_eq!(count, 0);

    // The same identity registers cleanly once delivery recovers.
    mailer.set_fail(false);
    service.register(&username, &email, "Passw0rd1").await?;
    Ok(())
}

#[tokio::test]
async fn resend_past_cooldown_reuses_the_same_code() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    // Zero cooldown stands in for "the window elapsed".
    let service = service_with(pool.clone(), mailer.clone(), 0);
    let (username, email) = identity("dave");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    let first_code = mailer.last_code().expect("registration delivered a code");

    let outcome = service.resend_code(&email).await?;
    assert_eq!(outcome, ResendOutcome::Reused);
    assert_eq!(code_row_count(&pool, account.id).await?, 1);
    assert_eq!(mailer.last_code().as_deref(), Some(first_code.as_str()));
    Ok(())
}

#[tokio::test]
async fn resend_delivery_failure_keeps_the_persisted_code() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool.clone(), mailer.clone(), 0);
    let (username, email) = identity("erin");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    let sent_before = mailer.sent_count();

    mailer.set_fail(true);
    let result = service.resend_code(&email).await;
    assert!(matches!(result, Err(AuthError::DeliveryFailed)));
    assert_eq!(code_row_count(&pool, account.id).await?, 1);

    // A retried resend still succeeds with the surviving code.
    mailer.set_fail(false);
    let outcome = service.resend_code(&email).await?;
    assert_eq!(outcome, ResendOutcome::Reused);
    assert_eq!(mailer.sent_count(), sent_before + 1);
    Ok(())
}

#[tokio::test]
async fn login_hides_verification_state_behind_credentials() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer.clone(), 60);
    let (username, email) = identity("frank");
    service.register(&username, &email, "Passw0rd1").await?;

    // Wrong password on an unverified account: credentials fail first.
    let result = service.login(&username, "WrongPass1").await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    let result = service.login(&username, "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::EmailNotVerified)));

    let result = service.login("no_such_user", "Passw0rd1").await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    let code = mailer.last_code().expect("registration delivered a code");
    service.verify_email(&email, &code).await?;
    let (account, pair) = service.login(&username, "Passw0rd1").await?;
    assert!(account.is_verified);
    assert!(!pair.access.is_empty());
    Ok(())
}

#[tokio::test]
async fn expired_code_reports_expired_without_spending_attempts() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool.clone(), mailer.clone(), 60);
    let (username, email) = identity("grace");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    sqlx::query(
        "UPDATE verification_codes SET expires_at = NOW() - INTERVAL '1 minute' WHERE account_id = $1",
    )
    .bind(account.id)
    .execute(&pool)
    .await?;

    let code = mailer.last_code().expect("registration delivered a code");
    let result = service.verify_email(&email, &code).await;
    assert!(matches!(result, Err(AuthError::CodeExpired)));
    assert_eq!(latest_code_state(&pool, account.id).await?, (false, 0));
    Ok(())
}

#[tokio::test]
async fn email_change_promotes_pending_address_on_verification() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer.clone(), 0);
    let (username, email) = identity("heidi");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    let code = mailer.last_code().expect("registration delivered a code");
    service.verify_email(&email, &code).await?;

    let (_, new_email) = identity("heidi_new");
    let staged = service.change_email(account.id, &new_email).await?;
    assert_eq!(staged.pending_email.as_deref(), Some(new_email.as_str()));

    // Verifying the old, already-confirmed address is rejected...
    let result = service.verify_email(&email, "000000").await;
    assert!(matches!(result, Err(AuthError::AlreadyVerified)));

    // ...while the pending address verifies and becomes primary.
    let code = mailer.last_code().expect("email change delivered a code");
    service.verify_email(&new_email, &code).await?;
    let (account, _) = service.login(&username, "Passw0rd1").await?;
    assert_eq!(account.email, new_email);
    assert_eq!(account.pending_email, None);
    Ok(())
}

#[tokio::test]
async fn username_change_enforces_uniqueness() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer, 60);
    let (username_a, email_a) = identity("ivan");
    let (username_b, email_b) = identity("judy");
    let account_a = service.register(&username_a, &email_a, "Passw0rd1").await?;
    service.register(&username_b, &email_b, "Passw0rd1").await?;

    let result = service.change_username(account_a.id, &username_b).await;
    assert!(matches!(result, Err(AuthError::UsernameExists)));

    let (fresh, _) = identity("ivan_new");
    let renamed = service.change_username(account_a.id, &fresh).await?;
    assert_eq!(renamed.username, fresh);
    Ok(())
}

#[tokio::test]
async fn session_resolution_prefers_valid_access_token() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer.clone(), 60);
    let (username, email) = identity("kim");

    let account = service.register(&username, &email, "Passw0rd1").await?;
    let code = mailer.last_code().expect("registration delivered a code");
    service.verify_email(&email, &code).await?;
    let (_, pair) = service.login(&username, "Passw0rd1").await?;
    let (anon_id, anon_token) = service.anonymous_session().await?;

    // Both valid: access wins.
    let state = service
        .resolve_session(Some(&pair.access), Some(&anon_token))
        .await?;
    assert_eq!(state, SessionState::Authenticated(account.id));

    // An access token for a vanished account falls through to anon.
    let issuer = service.issuer();
    let ghost_pair = issuer.issue_pair(Uuid::new_v4())?;
    let state = service
        .resolve_session(Some(&ghost_pair.access), Some(&anon_token))
        .await?;
    assert_eq!(state, SessionState::Anonymous(anon_id));
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_the_pair() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(pool, mailer.clone(), 60);
    let (username, email) = identity("leo");

    service.register(&username, &email, "Passw0rd1").await?;
    let code = mailer.last_code().expect("registration delivered a code");
    service.verify_email(&email, &code).await?;
    let (account, pair) = service.login(&username, "Passw0rd1").await?;

    let rotated = service.refresh(&pair.refresh).await?;
    let claims = service.issuer().decode(&rotated.access).expect("decodes");
    assert_eq!(claims.sub, account.id.to_string());

    // A refresh token for an account that no longer exists is NotFound.
    let ghost = service.issuer().issue_pair(Uuid::new_v4())?;
    let result = service.refresh(&ghost.refresh).await;
    assert!(matches!(result, Err(AuthError::NotFound)));
    Ok(())
}
