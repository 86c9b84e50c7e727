//! SMTP email delivery adapter.

use crate::types::{ChannelError, DeliveryAdapter, OutboundMessage};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use pulsecrm_types::conversation::Channel;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct EmailAdapter {
    /// SMTP server host.
    smtp_host: String,
    /// SMTP port (587 for STARTTLS).
    smtp_port: u16,
    /// Sender address and SMTP login.
    username: String,
    /// SECURITY: Password is zeroized on drop.
    password: Zeroizing<String>,
    /// Subject used when the message has none.
    default_subject: String,
}

impl EmailAdapter {
    pub fn new(
        smtp_host: String,
        smtp_port: u16,
        username: String,
        password: String,
        default_subject: String,
    ) -> Self {
        Self {
            smtp_host,
            smtp_port,
            username,
            password: Zeroizing::new(password),
            default_subject,
        }
    }

    fn build_message(&self, message: &OutboundMessage) -> Result<Message, ChannelError> {
        let from: Mailbox = self
            .username
            .parse()
            .map_err(|e| ChannelError::InvalidAddress(format!("sender '{}': {e}", self.username)))?;
        let to: Mailbox = message.recipient.parse().map_err(|e| {
            ChannelError::InvalidAddress(format!("recipient '{}': {e}", message.recipient))
        })?;
        let subject = message
            .subject
            .clone()
            .unwrap_or_else(|| self.default_subject.clone());

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(message.text.clone())
            .map_err(|e| ChannelError::Smtp(e.to_string()))
    }
}

#[async_trait]
impl DeliveryAdapter for EmailAdapter {
    fn name(&self) -> &str {
        "email"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let email = self.build_message(message)?;
        let creds = Credentials::new(self.username.clone(), self.password.to_string());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_host)
            .map_err(|e| ChannelError::Smtp(e.to_string()))?
            .port(self.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| ChannelError::Smtp(e.to_string()))?;
        info!(to = %message.recipient, "Sent email");
        debug!("SMTP delivered via {}:{}", self.smtp_host, self.smtp_port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> EmailAdapter {
        EmailAdapter::new(
            "smtp.example.com".to_string(),
            587,
            "ventas@example.com".to_string(),
            "secret".to_string(),
            "Mensaje de PulseCRM".to_string(),
        )
    }

    #[test]
    fn test_email_adapter_creation() {
        let adapter = adapter();
        assert_eq!(adapter.name(), "email");
        assert_eq!(adapter.channel(), Channel::Email);
    }

    #[test]
    fn test_build_message_uses_default_subject() {
        let msg = OutboundMessage::new(Channel::Email, "cliente@example.com", "Hola");
        let built = adapter().build_message(&msg).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("Subject: Mensaje de PulseCRM"));
        assert!(raw.contains("To: cliente@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails_before_connecting() {
        let msg = OutboundMessage::new(Channel::Email, "not-an-address", "Hola");
        assert!(matches!(
            adapter().send(&msg).await,
            Err(ChannelError::InvalidAddress(_))
        ));
    }
}
