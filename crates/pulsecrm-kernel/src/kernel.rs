//! `CrmKernel`: the shared handle every service hangs off.

use crate::error::{KernelError, KernelResult};
use dashmap::DashMap;
use pulsecrm_channels::n8n::N8nClient;
use pulsecrm_channels::publisher::MetaPublisher;
use pulsecrm_channels::{DeliveryHub, OutboundMessage};
use pulsecrm_memory::CrmStore;
use pulsecrm_runtime::CrmAi;
use pulsecrm_types::config::CrmConfig;
use pulsecrm_types::conversation::{Channel, Conversation};
use pulsecrm_types::customer::Customer;
use pulsecrm_types::lead::Lead;
use std::sync::Arc;
use tracing::{debug, info};

/// The PulseCRM kernel.
///
/// Owns the database handle, the optional LLM facade, the outbound delivery
/// hub and the Meta/n8n clients. Cheap to share behind an `Arc`.
pub struct CrmKernel {
    /// Effective configuration.
    pub config: CrmConfig,
    /// Relational store.
    pub store: CrmStore,
    /// `None` when no provider key is configured.
    pub ai: Option<CrmAi>,
    /// Outbound message routing.
    pub delivery: Arc<DeliveryHub>,
    /// Meta Graph publisher for posts and comment moderation.
    pub publisher: MetaPublisher,
    /// n8n workflow notifications.
    pub n8n: N8nClient,
    /// Next roster index per assignment pool.
    round_robin: DashMap<&'static str, usize>,
}

impl std::fmt::Debug for CrmKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmKernel")
            .field("ai", &self.ai)
            .field("n8n_enabled", &self.n8n.is_enabled())
            .finish_non_exhaustive()
    }
}

impl CrmKernel {
    /// Boot the kernel from a loaded configuration: open the database,
    /// build the LLM chain and the delivery adapters.
    pub fn boot_with_config(config: CrmConfig) -> KernelResult<Self> {
        config.validate()?;
        let db_path = config.db_path();
        let store = CrmStore::open(&db_path)?;
        let ai = CrmAi::from_config(&config)?;
        let delivery = Arc::new(DeliveryHub::from_config(&config));
        info!(
            db = %db_path.display(),
            model = ai.as_ref().map(|a| a.model_name()).unwrap_or("none"),
            "PulseCRM kernel booted"
        );
        Ok(Self::new(config, store, ai, delivery))
    }

    /// Assemble a kernel from already-built parts.
    pub fn new(
        config: CrmConfig,
        store: CrmStore,
        ai: Option<CrmAi>,
        delivery: Arc<DeliveryHub>,
    ) -> Self {
        let publisher = MetaPublisher::from_config(&config.meta);
        let n8n = N8nClient::new(config.n8n.webhook_url.clone());
        Self {
            config,
            store,
            ai,
            delivery,
            publisher,
            n8n,
            round_robin: DashMap::new(),
        }
    }

    pub(crate) fn require_ai(&self) -> KernelResult<&CrmAi> {
        self.ai.as_ref().ok_or(KernelError::AiUnavailable)
    }

    /// Model name recorded on persisted AI results.
    pub(crate) fn model_label(&self) -> String {
        self.ai
            .as_ref()
            .map(|a| a.model_name().to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Pick the next member of `roster` for `pool`, cycling in order.
    pub(crate) fn next_assignee(&self, pool: &'static str, roster: &[String]) -> Option<String> {
        if roster.is_empty() {
            return None;
        }
        let mut cursor = self.round_robin.entry(pool).or_insert(0);
        let picked = roster[*cursor % roster.len()].clone();
        *cursor = (*cursor + 1) % roster.len();
        Some(picked)
    }

    /// Send `text` through the adapter registered for `channel`.
    pub(crate) async fn send_text(
        &self,
        channel: Channel,
        recipient: &str,
        text: &str,
    ) -> KernelResult<()> {
        let message = OutboundMessage::new(channel, recipient, text);
        self.delivery.deliver(&message).await?;
        debug!(channel = %channel, recipient, "Message delivered");
        Ok(())
    }

    pub(crate) fn lead(&self, id: &str) -> KernelResult<Lead> {
        self.store
            .get_lead(id)?
            .ok_or_else(|| KernelError::not_found("lead", id))
    }

    pub(crate) fn customer(&self, id: &str) -> KernelResult<Customer> {
        self.store
            .get_customer(id)?
            .ok_or_else(|| KernelError::not_found("customer", id))
    }

    pub(crate) fn conversation(&self, id: &str) -> KernelResult<Conversation> {
        self.store
            .get_conversation(id)?
            .ok_or_else(|| KernelError::not_found("conversation", id))
    }

    /// Customer record behind a conversation, via its own link or its lead.
    pub(crate) fn conversation_customer(
        &self,
        conversation: &Conversation,
    ) -> KernelResult<Option<Customer>> {
        if let Some(id) = &conversation.customer_id {
            if let Some(c) = self.store.get_customer(id)? {
                return Ok(Some(c));
            }
        }
        match &conversation.lead_id {
            Some(lead_id) => Ok(self.store.get_customer_by_lead(lead_id)?),
            None => Ok(None),
        }
    }

    /// Where to reach the other side of a conversation on its own channel.
    pub(crate) fn conversation_recipient(
        &self,
        conversation: &Conversation,
    ) -> KernelResult<Option<String>> {
        if let Some(lead_id) = &conversation.lead_id {
            if let Some(lead) = self.store.get_lead(lead_id)? {
                if let Some(addr) = lead.contact_address() {
                    return Ok(Some(addr.to_string()));
                }
            }
        }
        Ok(self
            .conversation_customer(conversation)?
            .and_then(|c| c.contact_address().map(str::to_string)))
    }
}

/// Channel and address used to reach a customer directly: WhatsApp when a
/// phone is known, email otherwise.
pub(crate) fn customer_route(customer: &Customer) -> Option<(Channel, String)> {
    if let Some(phone) = customer.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        return Some((Channel::Whatsapp, phone.to_string()));
    }
    customer
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .map(|e| (Channel::Email, e.to_string()))
}

/// Channel and address used to reach a lead.
pub(crate) fn lead_route(lead: &Lead) -> Option<(Channel, String)> {
    match lead.source {
        Channel::Website | Channel::Unknown => lead
            .email
            .as_deref()
            .map(|e| (Channel::Email, e.to_string()))
            .or_else(|| lead.phone.as_deref().map(|p| (Channel::Whatsapp, p.to_string()))),
        channel => lead.contact_address().map(|a| (channel, a.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use chrono::Utc;

    #[test]
    fn round_robin_cycles_per_pool() {
        let (kernel, _) = test_kernel(None);
        let roster = vec!["ana".to_string(), "luis".to_string()];
        assert_eq!(kernel.next_assignee("sales", &roster).as_deref(), Some("ana"));
        assert_eq!(kernel.next_assignee("sales", &roster).as_deref(), Some("luis"));
        assert_eq!(kernel.next_assignee("sales", &roster).as_deref(), Some("ana"));
        assert_eq!(kernel.next_assignee("retention", &roster).as_deref(), Some("ana"));
        assert_eq!(kernel.next_assignee("support", &[]), None);
    }

    #[test]
    fn website_leads_are_reached_by_email() {
        let mut lead = Lead::new(Channel::Website, Utc::now());
        lead.email = Some("ana@example.com".into());
        lead.phone = Some("+50760001111".into());
        assert_eq!(
            lead_route(&lead),
            Some((Channel::Email, "ana@example.com".to_string()))
        );

        let mut wa = Lead::new(Channel::Whatsapp, Utc::now());
        wa.sender_id = Some("50760001111".into());
        assert_eq!(
            lead_route(&wa),
            Some((Channel::Whatsapp, "50760001111".to_string()))
        );
    }

    #[test]
    fn customers_prefer_whatsapp() {
        let mut c = Customer::new(Utc::now());
        assert_eq!(customer_route(&c), None);
        c.email = Some("a@b.com".into());
        assert_eq!(customer_route(&c).map(|r| r.0), Some(Channel::Email));
        c.phone = Some("+50760001111".into());
        assert_eq!(customer_route(&c).map(|r| r.0), Some(Channel::Whatsapp));
    }
}
