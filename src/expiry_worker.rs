use sqlx::{PgPool, Postgres, Transaction};
use tracing::{Span, field::display, instrument};
use uuid::Uuid;

use crate::configuration::Settings;
use crate::verification_codes::remove_verification_code;

pub async fn run_expiry_worker_until_stop(
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let db_url = settings.database.get_connection();
    let pool = PgPool::connect_lazy(&db_url)
        .expect("Failed to connect to the database");

    work_loop(pool).await
}

async fn work_loop(pool: PgPool) -> Result<(), anyhow::Error> {
    loop {
        match try_execute_expiry_task(&pool).await {
            Ok(ExecutionOutput::NoAvailableTask) => {
                tokio::time::sleep(std::time::Duration::from_secs(10)).await
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to execute a scheduled code expiry",
                );
                tokio::time::sleep(std::time::Duration::from_secs(2)).await
            }
            Ok(ExecutionOutput::TaskCompleted) => {}
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionOutput {
    TaskCompleted,
    NoAvailableTask,
}

/// Take one due task and run it. The code may already be gone (consumed by a
/// confirm or a password reset); the task still completes as a no-op.
#[instrument(
    skip_all,
    fields(verification_code_id = tracing::field::Empty)
)]
pub async fn try_execute_expiry_task(
    pool: &PgPool,
) -> Result<ExecutionOutput, anyhow::Error> {
    if let Some((mut tx, verification_code_id)) = dequeue_task(pool).await? {
        Span::current()
            .record("verification_code_id", display(&verification_code_id));

        let removed =
            remove_verification_code(&mut tx, verification_code_id).await?;
        if removed {
            tracing::info!("Expired verification code removed");
        } else {
            tracing::info!("Verification code was already gone");
        }

        delete_task(tx, verification_code_id).await?;
        Ok(ExecutionOutput::TaskCompleted)
    } else {
        Ok(ExecutionOutput::NoAvailableTask)
    }
}

#[instrument(skip_all)]
async fn dequeue_task(
    pool: &PgPool,
) -> Result<Option<(Transaction<'static, Postgres>, Uuid)>, anyhow::Error> {
    let mut tx = pool.begin().await?;

    // FOR UPDATE SKIP LOCKED keeps parallel workers off the same task
    let record: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT verification_code_id
        FROM code_expiry_queue
        WHERE execute_after < NOW()
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(verification_code_id) = record {
        return Ok(Some((tx, verification_code_id)));
    }

    Ok(None)
}

#[instrument(skip_all)]
async fn delete_task(
    mut tx: Transaction<'static, Postgres>,
    verification_code_id: Uuid,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        DELETE FROM code_expiry_queue
        WHERE verification_code_id = $1
        "#,
    )
    .bind(verification_code_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}
