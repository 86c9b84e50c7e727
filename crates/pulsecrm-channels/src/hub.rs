//! Channel-to-adapter routing for outbound messages.

use crate::email::EmailAdapter;
use crate::log::LogAdapter;
use crate::messenger::MetaMessengerAdapter;
use crate::types::{ChannelError, DeliveryAdapter, OutboundMessage};
use crate::whatsapp::WhatsAppAdapter;
use dashmap::DashMap;
use pulsecrm_types::config::{resolve_env, CrmConfig};
use pulsecrm_types::conversation::Channel;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds one adapter per channel plus an optional catch-all.
#[derive(Default)]
pub struct DeliveryHub {
    adapters: DashMap<Channel, Arc<dyn DeliveryAdapter>>,
    fallback: Option<Arc<dyn DeliveryAdapter>>,
}

impl DeliveryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter used for channels without a dedicated one.
    pub fn with_fallback(mut self, adapter: Arc<dyn DeliveryAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    /// Register (or replace) the adapter for `adapter.channel()`.
    pub fn register(&self, adapter: Arc<dyn DeliveryAdapter>) {
        info!(adapter = adapter.name(), channel = %adapter.channel(), "Delivery adapter registered");
        self.adapters.insert(adapter.channel(), adapter);
    }

    pub fn has_adapter(&self, channel: Channel) -> bool {
        self.adapters.contains_key(&channel)
    }

    /// Build adapters for every channel whose credentials are present.
    /// Anything else falls through to the log sink.
    pub fn from_config(config: &CrmConfig) -> Self {
        let hub = Self::new().with_fallback(Arc::new(LogAdapter::new()));

        if let Some(wa) = &config.channels.whatsapp {
            match resolve_env(&wa.access_token_env) {
                Some(token) if !wa.phone_number_id.is_empty() => hub.register(Arc::new(
                    WhatsAppAdapter::new(wa.phone_number_id.clone(), token, wa.allowed_users.clone())
                        .with_base_url(wa.api_base_url.clone()),
                )),
                _ => warn!(env = %wa.access_token_env, "WhatsApp configured without token or phone number id"),
            }
        }

        if let Some(email) = &config.channels.email {
            match resolve_env(&email.password_env) {
                Some(password) if !email.smtp_host.is_empty() => {
                    hub.register(Arc::new(EmailAdapter::new(
                        email.smtp_host.clone(),
                        email.smtp_port,
                        email.username.clone(),
                        password,
                        email.subject.clone(),
                    )))
                }
                _ => warn!(env = %email.password_env, "Email configured without SMTP host or password"),
            }
        }

        if let Some(token) = resolve_env(&config.meta.access_token_env) {
            for channel in [Channel::Messenger, Channel::Instagram] {
                match MetaMessengerAdapter::new(channel, token.clone(), config.meta.graph_base_url.clone()) {
                    Ok(adapter) => hub.register(Arc::new(adapter)),
                    Err(e) => warn!(error = %e, "Meta adapter not created"),
                }
            }
        }

        hub
    }

    /// Deliver `message` through the adapter for its channel.
    pub async fn deliver(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if message.recipient.trim().is_empty() {
            return Err(ChannelError::InvalidAddress("empty recipient".to_string()));
        }
        let adapter = self
            .adapters
            .get(&message.channel)
            .map(|a| Arc::clone(a.value()))
            .or_else(|| self.fallback.clone())
            .ok_or(ChannelError::NoAdapter(message.channel))?;
        adapter.send(message).await
    }
}
