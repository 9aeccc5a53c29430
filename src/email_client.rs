use crate::domain::user_email::UserEmail;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: UserEmail,
    server_token: SecretString,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
    html_body: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: UserEmail,
        server_token: SecretString,
        timeout_milliseconds: u64,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_milliseconds))
            .build()
            .unwrap();
        Self {
            http_client,
            base_url,
            sender,
            server_token,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &UserEmail,
        subject: &str,
        text_content: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/email", self.base_url);

        let request = SendEmailRequest {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject,
            text_body: text_content,
            html_body: html_content,
        };

        let builder = self
            .http_client
            .post(url)
            .header("X-Server-Token", self.server_token.expose_secret())
            .json(&request);
        let response = builder.send().await?;
        response.error_for_status()?;

        Ok(())
    }
}
