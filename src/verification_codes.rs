use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{Span, field::display, instrument};
use uuid::Uuid;

use crate::code_emails::{CodeEmailKind, send_code_email};
use crate::domain::user_email::UserEmail;
use crate::domain::verification_code::VerificationCode;
use crate::email_client::EmailClient;
use crate::users::get_user_by_email;

/// How long a code stays valid. The expiry task is scheduled once, at
/// creation; repeat requests re-send the same code without touching it.
pub const CODE_TTL_SECONDS: i64 = 600;

pub struct IssuedCode {
    pub code: VerificationCode,
    pub newly_created: bool,
}

/// The whole issuing pipeline for one email address.
///
/// `Ok(false)` means no account matches: nothing was stored, nothing was
/// sent. Delivery failures bubble up as errors and are not retried.
#[instrument(
    name = "Issue a code to a user",
    skip(pool, email_client, email),
    fields(user_id = tracing::field::Empty)
)]
pub async fn issue_code_to_user(
    pool: &PgPool,
    email_client: &EmailClient,
    app_name: &str,
    kind: CodeEmailKind,
    email: &UserEmail,
) -> Result<bool, anyhow::Error> {
    let user = get_user_by_email(pool, email)
        .await
        .context("Failed to look up the account for a code request")?;
    let Some(user) = user else {
        return Ok(false);
    };
    Span::current().record("user_id", display(&user.user_id));

    let mut tx = pool
        .begin()
        .await
        .context("Failed to acquire a Postgres connection from the pool")?;

    let issued = get_or_create_verification_code(&mut tx, user.user_id)
        .await
        .context("Failed to get or create the verification code")?;

    tx.commit().await.context(
        "Failed to commit SQL transaction to store a verification code",
    )?;

    if issued.newly_created {
        tracing::info!("Stored a new verification code");
    } else {
        tracing::info!("Re-sending the existing verification code");
    }

    send_code_email(email_client, app_name, kind, email, &user.name, &issued.code)
        .await
        .context("Failed to send the code email")?;

    Ok(true)
}

/// At most one live code per user: the unique index on `user_id` decides the
/// race, losers read the winner's row. The expiry task is scheduled only on
/// a fresh insert, in the same transaction.
#[instrument(name = "Get or create a verification code", skip(tx))]
pub async fn get_or_create_verification_code(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<IssuedCode, anyhow::Error> {
    let verification_code_id = Uuid::new_v4();
    let candidate = VerificationCode::generate();

    let created: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO verification_codes (id, user_id, code, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (user_id) DO NOTHING
        RETURNING code
        "#,
    )
    .bind(verification_code_id)
    .bind(user_id)
    .bind(candidate.as_ref())
    .fetch_optional(&mut **tx)
    .await?;

    match created {
        Some(_) => {
            schedule_code_expiry(tx, verification_code_id).await?;
            Ok(IssuedCode {
                code: candidate,
                newly_created: true,
            })
        }
        None => {
            let code: String = sqlx::query_scalar(
                r#"
                SELECT code
                FROM verification_codes
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?;
            let code = code
                .parse::<VerificationCode>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("Stored verification code is malformed")?;
            Ok(IssuedCode {
                code,
                newly_created: false,
            })
        }
    }
}

// NOW() is the transaction timestamp, so execute_after lands exactly
// CODE_TTL_SECONDS after the code's created_at.
#[instrument(name = "Schedule the code expiry task", skip(tx))]
async fn schedule_code_expiry(
    tx: &mut Transaction<'_, Postgres>,
    verification_code_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO code_expiry_queue (verification_code_id, execute_after)
        VALUES ($1, NOW() + make_interval(secs => $2))
        "#,
    )
    .bind(verification_code_id)
    .bind(CODE_TTL_SECONDS as f64)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Idempotent delete: reports whether a row was actually removed. A missing
/// code is a normal outcome, not an error.
#[instrument(name = "Remove a verification code", skip(tx))]
pub async fn remove_verification_code(
    tx: &mut Transaction<'_, Postgres>,
    verification_code_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let rows_affected = sqlx::query(
        r#"
        DELETE FROM verification_codes
        WHERE id = $1
        "#,
    )
    .bind(verification_code_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Delete the user's code if and only if it matches the submitted one.
/// Returns whether it matched; the scheduled expiry task is left alone and
/// later fires as a no-op.
#[instrument(name = "Consume a matching verification code", skip(tx, code))]
pub async fn consume_matching_code(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    code: &VerificationCode,
) -> Result<bool, sqlx::Error> {
    let rows_affected = sqlx::query(
        r#"
        DELETE FROM verification_codes
        WHERE user_id = $1 AND code = $2
        "#,
    )
    .bind(user_id)
    .bind(code.as_ref())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}
