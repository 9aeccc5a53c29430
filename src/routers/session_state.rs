use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json,
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, HeaderValue, StatusCode, request::Parts},
    response::IntoResponse,
};
use rand::distributions::{Alphanumeric, DistString};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::{app_state::AppState, routers::error_chain_fmt};

const SESSION_TOKEN_LENGTH: usize = 25;

/// The authenticated user behind a bearer session token.
///
/// Use it as an extractor: a handler taking `CurrentUser` rejects
/// unauthenticated requests, one taking `Option<CurrentUser>` lets
/// them through.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub session_token: String,
}

#[derive(thiserror::Error)]
pub(crate) enum SessionError {
    #[error("The request is not associated with a valid session.")]
    MissingSession(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSession(_) => StatusCode::UNAUTHORIZED,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> axum::response::Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            message: String,
            details: String,
        }

        let message = format!("{self}");
        let details = format!("{:?}", self);
        let body = Json(ErrorResponse { message, details });

        let status_code = self.status_code();
        let mut response = (status_code, body).into_response();

        match self {
            Self::MissingSession(_) => {
                response.headers_mut().insert(
                    "WWW-Authenticate",
                    HeaderValue::from_static("Bearer"),
                );
            }
            Self::UnexpectedError(_) => (),
        }

        response
            .extensions_mut()
            .insert(Arc::new(anyhow::anyhow!(self)));

        response
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session_token = bearer_token(&parts.headers)
            .map_err(SessionError::MissingSession)?;

        let user = get_session_user(&state.pool, &session_token)
            .await
            .context("Failed to look up the session")?;

        user.ok_or_else(|| {
            SessionError::MissingSession(anyhow::anyhow!(
                "Unknown session token"
            ))
        })
    }
}

impl OptionalFromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Ok(session_token) = bearer_token(&parts.headers) else {
            return Ok(None);
        };

        let user = get_session_user(&state.pool, &session_token)
            .await
            .context("Failed to look up the session")?;

        Ok(user)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<String, anyhow::Error> {
    let header_value = headers
        .get("Authorization")
        .context("The 'Authorization' header was missing")?
        .to_str()
        .context("The 'Authorization' header was not a valid UTF8 string.")?;
    let session_token = header_value
        .strip_prefix("Bearer ")
        .context("The authorization scheme was not 'Bearer'.")?;

    Ok(session_token.to_string())
}

#[instrument(name = "Look up the user behind a session", skip_all)]
async fn get_session_user(
    pool: &PgPool,
    session_token: &str,
) -> Result<Option<CurrentUser>, sqlx::Error> {
    let record = sqlx::query_as::<_, (Uuid, String, String, bool)>(
        r#"
        SELECT users.user_id, users.email, users.name, users.email_verified
        FROM sessions
        JOIN users ON users.user_id = sessions.user_id
        WHERE sessions.session_token = $1
        "#,
    )
    .bind(session_token)
    .fetch_optional(pool)
    .await?;

    Ok(record.map(|(user_id, email, name, email_verified)| CurrentUser {
        user_id,
        email,
        name,
        email_verified,
        session_token: session_token.to_string(),
    }))
}

#[instrument(name = "Store a new session", skip(pool))]
pub(crate) async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<String, sqlx::Error> {
    let session_token = Alphanumeric
        .sample_string(&mut rand::thread_rng(), SESSION_TOKEN_LENGTH);

    sqlx::query(
        r#"
        INSERT INTO sessions (session_token, user_id, created_at)
        VALUES ($1, $2, NOW())
        "#,
    )
    .bind(&session_token)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(session_token)
}

#[instrument(name = "Delete a session", skip_all)]
pub(crate) async fn delete_session(
    pool: &PgPool,
    session_token: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM sessions
        WHERE session_token = $1
        "#,
    )
    .bind(session_token)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(name = "Delete every session of a user", skip(tx))]
pub(crate) async fn delete_sessions_for_user(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM sessions
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
