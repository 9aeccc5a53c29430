mod health_check;
mod login;
mod me;
mod password_reset;
mod session_state;
mod verification_codes;

use std::sync::Arc;

use axum::routing::{get, post};
use sqlx::{Pool, Postgres};
use tower_http::trace::TraceLayer;

use crate::{app_state::AppState, email_client::EmailClient};

pub fn get_router(
    pool: Pool<Postgres>,
    email_client: EmailClient,
    app_name: String,
) -> axum::Router {
    let app_state = Arc::new(AppState {
        pool,
        email_client,
        app_name,
    });

    axum::Router::new()
        .route("/health", get(health_check::health_check))
        .route(
            "/verification-codes",
            post(verification_codes::issue_verification_code),
        )
        .route(
            "/verification-codes/confirm",
            post(verification_codes::confirm_verification_code),
        )
        .route(
            "/password-reset-codes",
            post(password_reset::issue_password_reset_code),
        )
        .route("/password-reset", post(password_reset::reset_password))
        .route("/login", post(login::login))
        .route("/logout", post(login::logout))
        .route("/me", get(me::get_me).post(me::auth_status))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub(crate) fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
