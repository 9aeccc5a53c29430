use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::routers::session_state::CurrentUser;

#[derive(Serialize, Debug)]
pub struct Profile {
    name: String,
    email: String,
    email_verified: bool,
}

#[derive(Serialize, Debug)]
pub struct AuthStatus {
    status: bool,
}

#[instrument(name = "Get the profile of the current user", skip(user))]
pub(crate) async fn get_me(user: CurrentUser) -> Json<Profile> {
    Json(Profile {
        name: user.name,
        email: user.email,
        email_verified: user.email_verified,
    })
}

/// Reports whether the caller holds a valid session. Anonymous callers get
/// `status: false` instead of a rejection.
#[instrument(name = "Check the auth status of the caller", skip(user))]
pub(crate) async fn auth_status(
    user: Option<CurrentUser>,
) -> Json<AuthStatus> {
    Json(AuthStatus {
        status: user.is_some(),
    })
}
