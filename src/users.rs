use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::user_email::UserEmail;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
}

#[instrument(name = "Look up a user by email", skip(pool, email))]
pub async fn get_user_by_email(
    pool: &PgPool,
    email: &UserEmail,
) -> Result<Option<UserRecord>, sqlx::Error> {
    sqlx::query_as::<_, UserRecord>(
        r#"
        SELECT user_id, email, name, email_verified
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email.as_ref())
    .fetch_optional(pool)
    .await
}
