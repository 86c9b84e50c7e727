//! Delivery sink that only logs and records what it was asked to send.
//!
//! Used as the hub's fallback when a channel has no configured adapter, and
//! by tests to observe outbound traffic.

use crate::types::{ChannelError, DeliveryAdapter, OutboundMessage};
use async_trait::async_trait;
use pulsecrm_types::conversation::Channel;
use std::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct LogAdapter {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl LogAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient == recipient)
            .collect()
    }
}

#[async_trait]
impl DeliveryAdapter for LogAdapter {
    fn name(&self) -> &str {
        "log"
    }

    fn channel(&self) -> Channel {
        Channel::Unknown
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        info!(
            channel = %message.channel,
            recipient = %message.recipient,
            preview = %message.text.chars().take(60).collect::<String>(),
            "Outbound message (log sink)"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_messages() {
        let log = LogAdapter::new();
        log.send(&OutboundMessage::new(Channel::Whatsapp, "507", "uno"))
            .await
            .unwrap();
        log.send(&OutboundMessage::new(Channel::Email, "a@b.co", "dos"))
            .await
            .unwrap();
        assert_eq!(log.sent().len(), 2);
        assert_eq!(log.sent_to("a@b.co")[0].text, "dos");
    }
}
