//! Process-level HTTP surface.
//!
//! Only the health endpoint lives here; the auth routes themselves belong
//! to the consuming API service. This module wires the dependency graph
//! (pool, token issuer, mail transport, config) at the entry point and
//! hands it to the router as extensions.

use anyhow::{Context, Result};
use axum::{extract::MatchedPath, http::Request, routing::get, Extension, Router};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Span};
use url::Url;

use crate::auth::{AuthConfig, AuthService, LogMailer, TokenIssuer};

pub mod handlers;

/// Start the server: connect, migrate, build the auth service, serve.
///
/// # Errors
///
/// Returns an error if the DSN is invalid, the database is unreachable,
/// migrations fail, or the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: String,
    secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    anon_ttl: Duration,
    auth_config: AuthConfig,
) -> Result<()> {
    // Fail early on an unparseable DSN instead of inside the pool.
    Url::parse(&dsn).context("invalid database DSN")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let issuer = TokenIssuer::new(&secret, access_ttl, refresh_ttl, anon_ttl);
    let auth = AuthService::new(pool.clone(), issuer, Arc::new(LogMailer), auth_config);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(Extension(auth))
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn make_span<B>(request: &Request<B>) -> Span {
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path
    )
}
