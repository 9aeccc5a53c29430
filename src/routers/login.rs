use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use secrecy::SecretString;
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_state::AppState,
    authentication::{AuthError, Credentials, validate_credentials},
    domain::user_email::UserEmail,
    routers::{
        error_chain_fmt,
        session_state::{CurrentUser, create_session, delete_session},
    },
};

#[derive(serde::Deserialize)]
pub struct LoginBody {
    pub email: UserEmail,
    pub password: SecretString,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    session_token: String,
}

#[instrument(
    name = "User login",
    skip(app_state, body),
    fields(user_id = tracing::field::Empty)
)]
pub(crate) async fn login(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, LoginError> {
    let credentials = Credentials {
        email: body.email,
        password: body.password,
    };

    let user_id = validate_credentials(&app_state.pool, credentials)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials(_) => LoginError::AuthError(e.into()),
            AuthError::UnexpectedError(_) => {
                LoginError::UnexpectedError(e.into())
            }
        })?;
    tracing::Span::current()
        .record("user_id", tracing::field::display(&user_id));

    let session_token = create_session(&app_state.pool, user_id)
        .await
        .context("Failed to store the new session")?;

    Ok(Json(LoginResponse { session_token }))
}

#[instrument(name = "User logout", skip(app_state, user))]
pub(crate) async fn logout(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<StatusCode, LogoutError> {
    delete_session(&app_state.pool, &user.session_token)
        .await
        .context("Failed to delete the session")?;
    tracing::info!("User {} logged out successfully.", user.user_id);

    Ok(StatusCode::OK)
}

#[derive(thiserror::Error)]
pub enum LoginError {
    #[error("Authentication failed.")]
    AuthError(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl LoginError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LoginError {
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

#[derive(thiserror::Error)]
pub enum LogoutError {
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for LogoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl IntoResponse for LogoutError {
    fn into_response(self) -> axum::response::Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            message: String,
            details: String,
        }

        let message = format!("{self}");
        let details = format!("{:?}", self);
        let body = Json(ErrorResponse { message, details });

        let mut response =
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        response
            .extensions_mut()
            .insert(Arc::new(anyhow::anyhow!(self)));

        response
    }
}
