//! Customer-facing chatbot.

use crate::error::KernelResult;
use crate::text::{contains_any, truncate_chars};
use crate::CrmKernel;
use pulsecrm_types::conversation::{Direction, SenderType};
use pulsecrm_types::message::Message;
use pulsecrm_types::routing::ChatReply;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ESCALATE_ACTION: &str = "escalate_to_human";

const ESCALATION_KEYWORDS: &[&str] = &[
    "reembolso",
    "devolución",
    "cancelar orden",
    "hablar con humano",
    "supervisor",
    "manager",
    "refund",
    "return",
    "cancel order",
    "human",
];

const ESCALATION_REPLY: &str =
    "Tu consulta requiere atención personalizada. Te estoy conectando con un agente humano.";

const FALLBACK_REPLY: &str =
    "Disculpa, tengo problemas técnicos en este momento. Un agente te contactará pronto.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
}

impl CrmKernel {
    /// Answer a customer message. Requests a human handoff when the message
    /// asks for one; falls back to a canned apology when the LLM fails.
    pub async fn chatbot_reply(&self, req: &ChatRequest) -> ChatReply {
        if contains_any(&req.message, ESCALATION_KEYWORDS) {
            info!(conversation_id = ?req.conversation_id, "Chatbot handing off to a human");
            return ChatReply {
                reply: ESCALATION_REPLY.to_string(),
                action: Some(ESCALATE_ACTION.to_string()),
                error: None,
            };
        }

        match self.generate_chat_reply(req).await {
            Ok(reply) => ChatReply {
                reply: truncate_chars(&reply, self.config.limits.max_message_length),
                action: None,
                error: None,
            },
            Err(e) => {
                warn!(conversation_id = ?req.conversation_id, error = %e, "Chatbot reply failed");
                ChatReply {
                    reply: FALLBACK_REPLY.to_string(),
                    action: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn generate_chat_reply(&self, req: &ChatRequest) -> KernelResult<String> {
        let ai = self.require_ai()?;
        let system = self.chat_system_prompt(req.customer_name.as_deref());

        let mut turns = match &req.conversation_id {
            Some(id) => self.history_turns(id)?,
            None => Vec::new(),
        };
        // The inbound message is usually already stored by the pipeline.
        if turns.last().map(|m: &Message| m.content.as_str()) == Some(req.message.as_str()) {
            turns.pop();
        }
        turns.push(Message::user(req.message.clone()));

        Ok(ai.chat(&system, turns, 0.7, 500).await?)
    }

    fn chat_system_prompt(&self, customer_name: Option<&str>) -> String {
        let company = &self.config.company;
        let mut prompt = format!(
            "You are the customer assistant of {}. Answer in the customer's language, \
             briefly and kindly. Never invent prices, stock or policies.",
            company.name
        );
        if !company.policies.is_empty() {
            prompt.push_str("\n\nCompany policies:\n");
            for policy in &company.policies {
                prompt.push_str("- ");
                prompt.push_str(policy);
                prompt.push('\n');
            }
        }
        if let Some(name) = customer_name.filter(|n| !n.trim().is_empty()) {
            prompt.push_str(&format!("\nThe customer's name is {name}."));
        }
        prompt
    }

    fn history_turns(&self, conversation_id: &str) -> KernelResult<Vec<Message>> {
        let limit = self.config.limits.max_conversation_history;
        Ok(self
            .store
            .recent_messages(conversation_id, limit)?
            .into_iter()
            .map(|m| match (m.direction, m.sender) {
                (Direction::Inbound, _) | (_, SenderType::Customer) => Message::user(m.content),
                _ => Message::assistant(m.content),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_kernel, test_kernel_with, ScriptedDriver};
    use chrono::{Duration, Utc};
    use pulsecrm_types::conversation::{Channel, Conversation, ConversationMessage};
    use pulsecrm_types::message::Role;

    fn ask(message: &str, conversation_id: Option<String>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            conversation_id,
            customer_name: Some("Ana".into()),
        }
    }

    #[tokio::test]
    async fn refund_request_escalates_without_llm_call() {
        let driver = ScriptedDriver::new(&["should not be used"]);
        let (kernel, _) = test_kernel(Some(driver.clone()));
        let reply = kernel.chatbot_reply(&ask("Quiero un REEMBOLSO ya", None)).await;
        assert_eq!(reply.action.as_deref(), Some(ESCALATE_ACTION));
        assert_eq!(reply.reply, ESCALATION_REPLY);
        assert_eq!(driver.calls(), 0);
    }

    #[tokio::test]
    async fn history_and_policies_reach_the_model() {
        let driver = ScriptedDriver::new(&["Claro, el envío tarda 3 días."]);
        let mut config = test_config();
        config.company.policies = vec!["Shipping takes 3 business days".into()];
        let (kernel, _) = test_kernel_with(config, Some(driver.clone()));

        let now = Utc::now();
        let conv = Conversation::new(Channel::Whatsapp, now);
        kernel.store.insert_conversation(&conv).unwrap();
        let first = ConversationMessage::inbound(&conv.id, "Hola", now - Duration::minutes(3));
        let bot = ConversationMessage::outbound(&conv.id, "¡Hola! ¿En qué te ayudo?", SenderType::Bot, now - Duration::minutes(2));
        let latest = ConversationMessage::inbound(&conv.id, "¿Cuánto tarda el envío?", now);
        for m in [&first, &bot, &latest] {
            kernel.store.insert_message(m).unwrap();
        }

        let reply = kernel
            .chatbot_reply(&ask("¿Cuánto tarda el envío?", Some(conv.id.clone())))
            .await;
        assert_eq!(reply.reply, "Claro, el envío tarda 3 días.");
        assert!(reply.error.is_none());

        let requests = driver.requests.lock().unwrap();
        let req = &requests[0];
        assert!(req.system.as_deref().unwrap().contains("Shipping takes 3 business days"));
        let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 500);
    }

    #[tokio::test]
    async fn long_replies_are_truncated() {
        let long = "a".repeat(50);
        let driver = ScriptedDriver::new(&[long.as_str()]);
        let mut config = test_config();
        config.limits.max_message_length = 10;
        let (kernel, _) = test_kernel_with(config, Some(driver));
        let reply = kernel.chatbot_reply(&ask("hola", None)).await;
        assert_eq!(reply.reply.chars().count(), 10);
    }

    #[tokio::test]
    async fn llm_failure_returns_canned_reply() {
        let (kernel, _) = test_kernel(Some(ScriptedDriver::failing(503)));
        let reply = kernel.chatbot_reply(&ask("hola", None)).await;
        assert_eq!(reply.reply, FALLBACK_REPLY);
        assert!(reply.error.is_some());
        assert!(reply.action.is_none());
    }
}
