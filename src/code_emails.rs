use tracing::instrument;

use crate::domain::user_email::UserEmail;
use crate::domain::verification_code::VerificationCode;
use crate::email_client::EmailClient;
use crate::verification_codes::CODE_TTL_SECONDS;

/// Which of the two code emails to send. Subject and wording differ, the
/// delivery path is the same.
#[derive(Debug, Clone, Copy)]
pub enum CodeEmailKind {
    Verification,
    PasswordReset,
}

impl CodeEmailKind {
    pub fn subject(&self, app_name: &str) -> String {
        match self {
            Self::Verification => format!("{app_name} - Verification Code"),
            Self::PasswordReset => {
                format!("{app_name} - Password Reset Code")
            }
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            Self::Verification => "verification code",
            Self::PasswordReset => "password reset code",
        }
    }
}

fn render_bodies(
    kind: CodeEmailKind,
    name: &str,
    app_name: &str,
    code: &VerificationCode,
) -> (String, String) {
    let noun = kind.noun();
    let minutes = CODE_TTL_SECONDS / 60;
    let code = code.as_ref();

    let text_body = format!(
        "Hi {name},\n\n\
        Your {app_name} {noun} is {code}.\n\
        The code expires in {minutes} minutes.\n"
    );
    let html_body = format!(
        "<p>Hi {name},</p>\
        <p>Your {app_name} {noun} is <strong>{code}</strong>.</p>\
        <p>The code expires in {minutes} minutes.</p>"
    );

    (text_body, html_body)
}

#[instrument(
    name = "Send a code email",
    skip(email_client, recipient, recipient_name, code)
)]
pub async fn send_code_email(
    email_client: &EmailClient,
    app_name: &str,
    kind: CodeEmailKind,
    recipient: &UserEmail,
    recipient_name: &str,
    code: &VerificationCode,
) -> Result<(), reqwest::Error> {
    let subject = kind.subject(app_name);
    let (text_body, html_body) =
        render_bodies(kind, recipient_name, app_name, code);

    email_client
        .send_email(recipient, &subject, &text_body, &html_body)
        .await
}
