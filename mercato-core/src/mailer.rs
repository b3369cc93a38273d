use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),

    #[error("Mail relay rejected message: {0}")]
    Rejected(String),
}

/// Outbound transactional mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), SendError>;
}

/// Used when no relay is configured; drops the message after logging it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), SendError> {
        tracing::info!(
            to = %mercato_shared::Masked(message.to.as_str()),
            subject = %message.subject,
            "No mail relay configured, message logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let mailer = LogMailer;
        let result = mailer
            .send(EmailMessage {
                to: "ops@shop.example".to_string(),
                subject: "hello".to_string(),
                body: "world".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}
