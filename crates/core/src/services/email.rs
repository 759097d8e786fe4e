//! Email channel over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use herald_common::config::SmtpConfig;
use herald_common::{AppError, AppResult};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::channels::{ChannelAdapter, ChannelMessage, Recipient};
use super::event::Channel;

/// Email adapter.
#[derive(Clone)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    /// Build the SMTP transport from configuration.
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| AppError::Config(format!("Invalid SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(SmtpCredentials::new(user.clone(), pass.clone()));
        }

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config
                .from_address
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid from address: {e}")))?,
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Build the plain-text message for one recipient.
pub fn build_message(from: &Mailbox, to: &str, message: &ChannelMessage) -> AppResult<Message> {
    let to: Mailbox = to
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {e}")))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(&message.title)
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: &Recipient,
        message: &ChannelMessage,
    ) -> AppResult<Option<String>> {
        let address = recipient
            .email
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("No email address on file".to_string()))?;

        let email = build_message(&self.from, address, message)?;
        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| AppError::ExternalService(format!("SMTP send failed: {e}")))?;

        tracing::debug!(
            user_id = %recipient.user_id,
            tenant_id = %recipient.tenant_id,
            code = %response.code(),
            "Email accepted by relay"
        );

        Ok(response.message().next().map(ToString::to_string))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event::{NotificationCategory, Priority};

    fn message() -> ChannelMessage {
        ChannelMessage {
            category: NotificationCategory::Banking,
            priority: Priority::High,
            title: "New transaction".to_string(),
            body: "-$250.50 at SuperMart".to_string(),
            data: serde_json::Value::Null,
        }
    }

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 465,
            use_tls: true,
            username: Some("herald".to_string()),
            password: Some("secret".to_string()),
            from_address: "noreply@example.com".to_string(),
            from_name: "Herald".to_string(),
            timeout_secs: 15,
        }
    }

    #[test]
    fn test_build_message() {
        let from: Mailbox = "Herald <noreply@example.com>".parse().unwrap();
        let email = build_message(&from, "ana@example.com", &message()).unwrap();

        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: New transaction"));
        assert!(raw.contains("To: ana@example.com"));
        assert!(raw.contains("SuperMart"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let from: Mailbox = "noreply@example.com".parse().unwrap();
        assert!(build_message(&from, "nobody", &message()).is_err());
    }

    #[test]
    fn test_new_rejects_bad_from_address() {
        let mut config = config();
        config.from_address = "not an address".to_string();
        assert!(EmailChannel::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_send_without_address_fails_locally() {
        let channel = EmailChannel::new(&config()).unwrap();
        let recipient = Recipient {
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            email: None,
            phone: None,
        };

        let err = channel.send(&recipient, &message()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
