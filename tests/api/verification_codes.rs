use reqwest::StatusCode;
use serde_json::json;
use time::OffsetDateTime;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helper::{TestApp, spawn_app};

async fn mount_email_ok(app: &TestApp) {
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;
}

/// A 6-digit string that is guaranteed not to match the stored code.
fn wrong_code(stored: &str) -> &'static str {
    if stored == "000000" { "000001" } else { "000000" }
}

#[tokio::test]
async fn issue_returns_200_and_stores_a_code() {
    let app = spawn_app().await;
    mount_email_ok(&app).await;

    let response = app
        .post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;

    assert!(response.status().is_success(), "Issuing the code failed");

    let code = app.stored_code().await;
    assert_eq!(code.len(), 6);
    assert!(
        code.chars().all(|c| c.is_ascii_digit()),
        "Expected a numeric code, got '{code}'"
    );
}

#[tokio::test]
async fn issue_schedules_the_expiry_600_seconds_out() {
    let app = spawn_app().await;
    mount_email_ok(&app).await;

    app.post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;

    let (created_at, execute_after): (OffsetDateTime, OffsetDateTime) =
        sqlx::query_as(
            r#"
            SELECT verification_codes.created_at,
                   code_expiry_queue.execute_after
            FROM code_expiry_queue
            JOIN verification_codes
                ON verification_codes.id
                    = code_expiry_queue.verification_code_id
            WHERE verification_codes.user_id = $1
            "#,
        )
        .bind(app.test_user.user_id)
        .fetch_one(&app.pool)
        .await
        .expect("No scheduled expiry for the stored code");

    assert_eq!((execute_after - created_at).whole_seconds(), 600);
}

#[tokio::test]
async fn repeated_issue_reuses_the_code_and_keeps_the_schedule() {
    let app = spawn_app().await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;

    let body = json!({ "email": app.test_user.email });

    let first = app.post_verification_codes(&body).await;
    assert!(first.status().is_success());
    let first_code = app.stored_code().await;
    let first_deadline = scheduled_deadline(&app).await;

    let second = app.post_verification_codes(&body).await;
    assert!(second.status().is_success());
    let second_code = app.stored_code().await;
    let second_deadline = scheduled_deadline(&app).await;

    assert_eq!(first_code, second_code, "A second request minted a new code");
    assert_eq!(
        first_deadline, second_deadline,
        "A second request moved the expiry deadline"
    );

    let code_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_codes WHERE user_id = $1",
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("Failed to count the stored codes");
    assert_eq!(code_rows, 1);

    let queue_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM code_expiry_queue")
            .fetch_one(&app.pool)
            .await
            .expect("Failed to count the scheduled expiries");
    assert_eq!(queue_rows, 1);
}

#[tokio::test]
async fn issue_returns_404_for_an_unknown_email() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app
        .post_verification_codes(&json!({
            "email": "no-such-user@example.com"
        }))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let code_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM verification_codes")
            .fetch_one(&app.pool)
            .await
            .expect("Failed to count the stored codes");
    assert_eq!(code_rows, 0, "A code was stored for an unknown email");
}

#[tokio::test]
async fn issue_returns_422_for_invalid_bodies() {
    let app = spawn_app().await;
    // table-driven test
    let invalid_bodies = vec![
        (json!({}), "missing email"),
        (json!({ "email": "" }), "empty email"),
        (json!({ "email": "noisy_drop.gmail.com" }), "email without @"),
    ];

    for (body, flaw) in invalid_bodies {
        let response = app.post_verification_codes(&body).await;

        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "Expected 422 when the payload was {flaw}"
        );
    }
}

#[tokio::test]
async fn code_email_carries_the_stored_code() {
    let app = spawn_app().await;
    mount_email_ok(&app).await;

    app.post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;

    let request = &app.email_server.received_requests().await.unwrap()[0];
    let body: serde_json::Value =
        serde_json::from_slice(&request.body).expect("Invalid request body");

    let code = app.stored_code().await;

    assert_eq!(
        body["Subject"],
        format!("{} - Verification Code", app.app_name).as_str()
    );
    assert_eq!(body["To"], app.test_user.email.as_str());
    let text = body["TextBody"].as_str().unwrap();
    assert!(text.contains(&code), "The text body misses the code");
    assert!(
        text.contains(&app.test_user.name),
        "The text body misses the recipient name"
    );
    let html = body["HtmlBody"].as_str().unwrap();
    assert!(html.contains(&code), "The html body misses the code");
}

#[tokio::test]
async fn issue_returns_500_when_delivery_fails_but_keeps_the_code() {
    let app = spawn_app().await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.email_server)
        .await;

    let response = app
        .post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The code was committed before the send, so a later request can still
    // resend it.
    let code_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_codes WHERE user_id = $1",
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("Failed to count the stored codes");
    assert_eq!(code_rows, 1);
}

#[tokio::test]
async fn confirm_marks_the_email_verified_and_consumes_the_code() {
    let app = spawn_app().await;
    mount_email_ok(&app).await;

    app.post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;
    let code = app.stored_code().await;

    let response = app
        .post_confirm(&json!({
            "email": app.test_user.email,
            "code": code,
        }))
        .await;

    assert!(response.status().is_success(), "Confirming the code failed");

    let email_verified: bool = sqlx::query_scalar(
        "SELECT email_verified FROM users WHERE user_id = $1",
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("Failed to fetch the user");
    assert!(email_verified, "The email was not marked as verified");

    let code_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_codes WHERE user_id = $1",
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("Failed to count the stored codes");
    assert_eq!(code_rows, 0, "The code survived its confirmation");

    // The scheduled expiry stays behind and later fires as a no-op.
    let queue_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM code_expiry_queue")
            .fetch_one(&app.pool)
            .await
            .expect("Failed to count the scheduled expiries");
    assert_eq!(queue_rows, 1);
}

#[tokio::test]
async fn confirm_returns_401_for_a_wrong_code() {
    let app = spawn_app().await;
    mount_email_ok(&app).await;

    app.post_verification_codes(&json!({ "email": app.test_user.email }))
        .await;
    let code = app.stored_code().await;

    let response = app
        .post_confirm(&json!({
            "email": app.test_user.email,
            "code": wrong_code(&code),
        }))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let email_verified: bool = sqlx::query_scalar(
        "SELECT email_verified FROM users WHERE user_id = $1",
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("Failed to fetch the user");
    assert!(!email_verified, "A wrong code verified the email");

    let stored = app.stored_code().await;
    assert_eq!(stored, code, "A wrong code consumed the stored one");
}

#[tokio::test]
async fn confirm_returns_401_for_an_unknown_email() {
    let app = spawn_app().await;

    let response = app
        .post_confirm(&json!({
            "email": "no-such-user@example.com",
            "code": "123456",
        }))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn confirm_returns_422_for_malformed_codes() {
    let app = spawn_app().await;
    // table-driven test
    let invalid_codes =
        vec![("12345", "too short"), ("1234567", "too long"),
            ("12a456", "not numeric"), ("", "empty")];

    for (code, flaw) in invalid_codes {
        let response = app
            .post_confirm(&json!({
                "email": app.test_user.email,
                "code": code,
            }))
            .await;

        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "Expected 422 when the code was {flaw}"
        );
    }
}

async fn scheduled_deadline(app: &TestApp) -> OffsetDateTime {
    sqlx::query_scalar(
        r#"
        SELECT execute_after
        FROM code_expiry_queue
        JOIN verification_codes
            ON verification_codes.id
                = code_expiry_queue.verification_code_id
        WHERE verification_codes.user_id = $1
        "#,
    )
    .bind(app.test_user.user_id)
    .fetch_one(&app.pool)
    .await
    .expect("No scheduled expiry for the stored code")
}
