//! WhatsApp Cloud API delivery adapter.
//!
//! Sends text through `POST {base}/{phone_number_id}/messages`. Long
//! replies are split to the platform limit and sent in order.

use crate::types::{check_response, split_message, ChannelError, DeliveryAdapter, OutboundMessage};
use async_trait::async_trait;
use pulsecrm_types::conversation::Channel;
use tracing::{debug, info};
use zeroize::Zeroizing;

const MAX_MESSAGE_LEN: usize = 4096;

pub struct WhatsAppAdapter {
    /// WhatsApp Business phone number ID.
    phone_number_id: String,
    /// SECURITY: Access token is zeroized on drop.
    access_token: Zeroizing<String>,
    /// Graph API root, e.g. `https://graph.facebook.com/v21.0`.
    api_base_url: String,
    client: reqwest::Client,
    /// Allowed phone numbers (empty = allow all).
    allowed_users: Vec<String>,
}

impl WhatsAppAdapter {
    pub fn new(phone_number_id: String, access_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            phone_number_id,
            access_token: Zeroizing::new(access_token),
            api_base_url: "https://graph.facebook.com/v21.0".to_string(),
            client: reqwest::Client::new(),
            allowed_users,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base_url, self.phone_number_id)
    }

    /// Check if a phone number is allowed.
    fn is_allowed(&self, phone: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == phone)
    }

    fn text_body(to: &str, chunk: &str) -> serde_json::Value {
        serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": chunk }
        })
    }
}

#[async_trait]
impl DeliveryAdapter for WhatsAppAdapter {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let to = message.recipient.trim_start_matches('+');
        if !self.is_allowed(&message.recipient) && !self.is_allowed(to) {
            return Err(ChannelError::NotAllowed(message.recipient.clone()));
        }

        let url = self.messages_url();
        for chunk in split_message(&message.text, MAX_MESSAGE_LEN) {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(self.access_token.as_str())
                .json(&Self::text_body(to, chunk))
                .send()
                .await?;
            check_response("whatsapp", resp).await?;
            debug!(to, bytes = chunk.len(), "WhatsApp chunk sent");
        }
        info!(to, "WhatsApp message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_adapter_creation() {
        let adapter = WhatsAppAdapter::new("12345".to_string(), "token".to_string(), vec![])
            .with_base_url("http://localhost:9999/v21.0/");
        assert_eq!(adapter.name(), "whatsapp");
        assert_eq!(adapter.channel(), Channel::Whatsapp);
        assert_eq!(
            adapter.messages_url(),
            "http://localhost:9999/v21.0/12345/messages"
        );
    }

    #[test]
    fn test_allowed_users_check() {
        let adapter = WhatsAppAdapter::new(
            "12345".to_string(),
            "token".to_string(),
            vec!["+50761234567".to_string()],
        );
        assert!(adapter.is_allowed("+50761234567"));
        assert!(!adapter.is_allowed("+9999999999"));

        let open = WhatsAppAdapter::new("12345".to_string(), "token".to_string(), vec![]);
        assert!(open.is_allowed("+anything"));
    }

    #[test]
    fn test_text_body_shape() {
        let body = WhatsAppAdapter::text_body("50761234567", "Hola");
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Hola");
    }

    #[tokio::test]
    async fn test_disallowed_recipient_is_rejected_before_sending() {
        let adapter = WhatsAppAdapter::new(
            "12345".to_string(),
            "token".to_string(),
            vec!["+50761234567".to_string()],
        )
        .with_base_url("http://127.0.0.1:9");
        let msg = OutboundMessage::new(Channel::Whatsapp, "+15550000000", "hi");
        assert!(matches!(
            adapter.send(&msg).await,
            Err(ChannelError::NotAllowed(_))
        ));
    }
}
