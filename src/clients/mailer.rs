use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Email request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Email API returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    /// The actionable link carried by the message.
    pub link: String,
}

impl EmailMessage {
    #[must_use]
    pub fn claim_link(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Finish setting up your account".to_string(),
            text: format!(
                "Thanks for subscribing!\n\nCreate your password to start using your account:\n{link}\n\nThis link can be used once and expires in a few days."
            ),
            link: link.to_string(),
        }
    }

    #[must_use]
    pub fn login_link(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your sign-in link".to_string(),
            text: format!(
                "Use this link to sign in:\n{link}\n\nIf you did not request it you can ignore this email."
            ),
            link: link.to_string(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Sends through a JSON email API (`POST {api_url}` with bearer auth).
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    #[must_use]
    pub fn new(api_url: &str, api_key: &str, from_address: &str) -> Self {
        Self {
            client: Client::builder()
                .user_agent("Quizgate/1.0")
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from_address: from_address.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let body = SendEmailBody {
            from: &self.from_address,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            link = %message.link,
            "Email delivery not configured, logging message"
        );
        Ok(())
    }
}

/// Build the mailer selected by configuration.
#[must_use]
pub fn from_config(config: &EmailConfig) -> Box<dyn Mailer> {
    match config.api_key.as_deref() {
        Some(key) => Box::new(HttpMailer::new(&config.api_url, key, &config.from_address)),
        None => Box::new(LogMailer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_message_carries_link() {
        let msg = EmailMessage::claim_link("a@example.com", "https://q.example/claim?token=abc");
        assert_eq!(msg.to, "a@example.com");
        assert!(msg.text.contains("https://q.example/claim?token=abc"));
        assert_eq!(msg.link, "https://q.example/claim?token=abc");
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let msg =
            EmailMessage::login_link("a@example.com", "https://q.example/api/auth/callback?token=x");
        assert!(LogMailer.send(&msg).await.is_ok());
    }
}
