//! Meta Send API adapter for Messenger and Instagram Direct.

use crate::types::{check_response, split_message, ChannelError, DeliveryAdapter, OutboundMessage};
use async_trait::async_trait;
use pulsecrm_types::conversation::Channel;
use tracing::info;
use zeroize::Zeroizing;

pub struct MetaMessengerAdapter {
    channel: Channel,
    access_token: Zeroizing<String>,
    graph_base_url: String,
    client: reqwest::Client,
}

impl MetaMessengerAdapter {
    /// `channel` must be `Messenger` or `Instagram`.
    pub fn new(
        channel: Channel,
        access_token: String,
        graph_base_url: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        if !matches!(channel, Channel::Messenger | Channel::Instagram) {
            return Err(ChannelError::Unsupported(format!(
                "Send API does not serve channel {channel}"
            )));
        }
        Ok(Self {
            channel,
            access_token: Zeroizing::new(access_token),
            graph_base_url: graph_base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn max_len(&self) -> usize {
        match self.channel {
            Channel::Instagram => 1000,
            _ => 2000,
        }
    }
}

#[async_trait]
impl DeliveryAdapter for MetaMessengerAdapter {
    fn name(&self) -> &str {
        match self.channel {
            Channel::Instagram => "instagram",
            _ => "messenger",
        }
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let url = format!("{}/me/messages", self.graph_base_url);
        for chunk in split_message(&message.text, self.max_len()) {
            let body = serde_json::json!({
                "recipient": { "id": message.recipient },
                "messaging_type": "RESPONSE",
                "message": { "text": chunk }
            });
            let resp = self
                .client
                .post(&url)
                .bearer_auth(self.access_token.as_str())
                .json(&body)
                .send()
                .await?;
            check_response("meta", resp).await?;
        }
        info!(channel = %self.channel, recipient = %message.recipient, "Meta message delivered");
        Ok(())
    }
}
