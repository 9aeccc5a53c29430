use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    code_emails::CodeEmailKind,
    domain::{user_email::UserEmail, verification_code::VerificationCode},
    routers::error_chain_fmt,
    users::get_user_by_email,
    verification_codes::{consume_matching_code, issue_code_to_user},
};

#[derive(serde::Deserialize)]
pub struct IssueCodeBody {
    pub email: UserEmail,
}

/// Shared by the verification code and the password reset code endpoints;
/// both issue through the same pipeline.
#[derive(thiserror::Error)]
pub(crate) enum IssueCodeError {
    #[error("No account matches the given email address.")]
    UnknownEmail,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for IssueCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl IssueCodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownEmail => StatusCode::NOT_FOUND,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IssueCodeError {
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

#[instrument(
    name = "Request a verification code",
    skip(app_state, body)
)]
pub(crate) async fn issue_verification_code(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<IssueCodeBody>,
) -> Result<StatusCode, IssueCodeError> {
    let sent = issue_code_to_user(
        &app_state.pool,
        &app_state.email_client,
        &app_state.app_name,
        CodeEmailKind::Verification,
        &body.email,
    )
    .await?;

    if !sent {
        return Err(IssueCodeError::UnknownEmail);
    }

    Ok(StatusCode::OK)
}

#[derive(serde::Deserialize)]
pub struct ConfirmCodeBody {
    pub email: UserEmail,
    pub code: VerificationCode,
}

#[derive(thiserror::Error)]
pub enum ConfirmCodeError {
    #[error("The email and code combination is not valid.")]
    InvalidCode,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for ConfirmCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ConfirmCodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCode => StatusCode::UNAUTHORIZED,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConfirmCodeError {
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

#[instrument(
    name = "Confirm an email address with a code",
    skip(app_state, body),
    fields(user_id = tracing::field::Empty)
)]
pub(crate) async fn confirm_verification_code(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ConfirmCodeBody>,
) -> Result<StatusCode, ConfirmCodeError> {
    let user = get_user_by_email(&app_state.pool, &body.email)
        .await
        .context("Failed to look up the account for a code confirmation")?
        .ok_or(ConfirmCodeError::InvalidCode)?;
    tracing::Span::current()
        .record("user_id", tracing::field::display(&user.user_id));

    let mut tx = app_state
        .pool
        .begin()
        .await
        .context("Failed to acquire a database connection")?;

    let matched = consume_matching_code(&mut tx, user.user_id, &body.code)
        .await
        .context("Failed to consume the verification code")?;
    if !matched {
        return Err(ConfirmCodeError::InvalidCode);
    }

    mark_email_verified(&mut tx, user.user_id)
        .await
        .context("Failed to mark the email address as verified")?;

    tx.commit()
        .await
        .context("Failed to commit the code confirmation")?;

    Ok(StatusCode::OK)
}

#[instrument(name = "Mark an email address as verified", skip(tx))]
async fn mark_email_verified(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET email_verified = TRUE
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
