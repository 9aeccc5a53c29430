use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    authentication::compute_password_hash,
    code_emails::CodeEmailKind,
    domain::{user_email::UserEmail, verification_code::VerificationCode},
    routers::{
        error_chain_fmt,
        session_state::delete_sessions_for_user,
        verification_codes::IssueCodeError,
    },
    telemetry::spawn_blocking_with_tracing,
    users::get_user_by_email,
    verification_codes::{consume_matching_code, issue_code_to_user},
};

const MIN_PASSWORD_LENGTH: usize = 12;

#[derive(serde::Deserialize)]
pub struct ResetCodeBody {
    pub email: UserEmail,
}

#[instrument(
    name = "Request a password reset code",
    skip(app_state, body)
)]
pub(crate) async fn issue_password_reset_code(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ResetCodeBody>,
) -> Result<StatusCode, IssueCodeError> {
    let sent = issue_code_to_user(
        &app_state.pool,
        &app_state.email_client,
        &app_state.app_name,
        CodeEmailKind::PasswordReset,
        &body.email,
    )
    .await?;

    if !sent {
        return Err(IssueCodeError::UnknownEmail);
    }

    Ok(StatusCode::OK)
}

#[derive(serde::Deserialize)]
pub struct ResetPasswordBody {
    pub email: UserEmail,
    pub code: VerificationCode,
    pub new_password: SecretString,
}

#[derive(thiserror::Error)]
pub enum ResetPasswordError {
    #[error("The email and code combination is not valid.")]
    InvalidCode,
    #[error("The new password does not meet the length requirement.")]
    WeakPassword,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for ResetPasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResetPasswordError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCode => StatusCode::UNAUTHORIZED,
            Self::WeakPassword => StatusCode::BAD_REQUEST,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResetPasswordError {
    fn into_response(self) -> axum::response::Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            message: String,
            details: String,
        }

        let message = format!("{self}");
        let details = format!("{:?}", self);
        let body = Json(ErrorResponse { message, details });

        let mut response = (self.status_code(), body).into_response();
        response
            .extensions_mut()
            .insert(Arc::new(anyhow::anyhow!(self)));

        response
    }
}

/// A valid code proves control of the mailbox, so the reset also revokes
/// every open session of the user.
#[instrument(
    name = "Reset a password with a code",
    skip(app_state, body),
    fields(user_id = tracing::field::Empty)
)]
pub(crate) async fn reset_password(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ResetPasswordBody>,
) -> Result<StatusCode, ResetPasswordError> {
    let ResetPasswordBody {
        email,
        code,
        new_password,
    } = body;

    if new_password.expose_secret().len() < MIN_PASSWORD_LENGTH {
        return Err(ResetPasswordError::WeakPassword);
    }

    let user = get_user_by_email(&app_state.pool, &email)
        .await
        .context("Failed to look up the account for a password reset")?
        .ok_or(ResetPasswordError::InvalidCode)?;
    tracing::Span::current()
        .record("user_id", tracing::field::display(&user.user_id));

    let password_hash = spawn_blocking_with_tracing(move || {
        compute_password_hash(new_password)
    })
    .await
    .context("Failed to spawn a blocking task")?
    .context("Failed to hash the new password")?;

    let mut tx = app_state
        .pool
        .begin()
        .await
        .context("Failed to acquire a database connection")?;

    let matched = consume_matching_code(&mut tx, user.user_id, &code)
        .await
        .context("Failed to consume the password reset code")?;
    if !matched {
        return Err(ResetPasswordError::InvalidCode);
    }

    update_password_hash(&mut tx, user.user_id, &password_hash)
        .await
        .context("Failed to store the new password hash")?;

    let revoked = delete_sessions_for_user(&mut tx, user.user_id)
        .await
        .context("Failed to revoke the open sessions")?;
    tracing::info!("Revoked {revoked} open sessions");

    tx.commit()
        .await
        .context("Failed to commit the password reset")?;

    Ok(StatusCode::OK)
}

#[instrument(name = "Update a stored password hash", skip(tx, password_hash))]
async fn update_password_hash(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    password_hash: &SecretString,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1
        WHERE user_id = $2
        "#,
    )
    .bind(password_hash.expose_secret())
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
