use async_trait::async_trait;
use mercato_core::{EmailMessage, Mailer, SendError};
use mercato_shared::Masked;
use std::time::Duration;
use tracing::info;

/// Posts messages as JSON to a transactional mail relay
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>, timeout: Duration) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            relay_url: relay_url.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| SendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected(format!("{}: {}", status, body)));
        }

        info!(to = %Masked(message.to.as_str()), subject = %message.subject, "Mail handed to relay");
        Ok(())
    }
}
