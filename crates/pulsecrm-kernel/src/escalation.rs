//! Human escalation.

use crate::error::KernelResult;
use crate::text::contains_any;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::case::{Case, EscalationReason};
use pulsecrm_types::conversation::{Conversation, ConversationStatus};
use pulsecrm_types::customer::CustomerSegment;
use tracing::{info, warn};

const NEGATIVE_SENTIMENT_THRESHOLD: f64 = -0.7;
const MIN_MESSAGES_FOR_SENTIMENT: u32 = 3;

const HUMAN_REQUEST_KEYWORDS: &[&str] = &[
    "hablar con humano",
    "agente humano",
    "supervisor",
    "manager",
    "representante",
    "persona real",
    "talk to a human",
    "real person",
    "representative",
];

const LEGAL_KEYWORDS: &[&str] = &[
    "demanda",
    "abogado",
    "legal",
    "demandar",
    "regulación",
    "compliance",
    "violación",
    "lawsuit",
    "lawyer",
];

impl CrmKernel {
    /// First escalation trigger that applies to `message` in `conversation`.
    pub fn should_escalate(
        &self,
        conversation: &Conversation,
        message: &str,
    ) -> KernelResult<Option<EscalationReason>> {
        if let Some(avg) = conversation.avg_sentiment_score {
            if avg < NEGATIVE_SENTIMENT_THRESHOLD
                && conversation.message_count > MIN_MESSAGES_FOR_SENTIMENT
            {
                return Ok(Some(EscalationReason::HighSentimentNegative));
            }
        }
        if contains_any(message, HUMAN_REQUEST_KEYWORDS) {
            return Ok(Some(EscalationReason::CustomerRequest));
        }
        if contains_any(message, LEGAL_KEYWORDS) {
            return Ok(Some(EscalationReason::LegalIssue));
        }
        if let Some(customer) = self.conversation_customer(conversation)? {
            if customer.segment == CustomerSegment::Vip {
                return Ok(Some(EscalationReason::VipCustomer));
            }
        }
        Ok(None)
    }

    /// Open a case for the conversation and hand it to an agent. A
    /// conversation with an open case keeps that case.
    pub fn escalate(&self, conversation_id: &str, reason: EscalationReason) -> KernelResult<Case> {
        let mut conversation = self.conversation(conversation_id)?;
        if let Some(existing) = self.store.open_case_for_conversation(conversation_id)? {
            warn!(conversation_id, case_id = %existing.id, "Conversation already escalated");
            return Ok(existing);
        }

        let now = Utc::now();
        let mut case = Case::new(
            format!("Escalation: {reason}"),
            reason.priority(),
            now,
        );
        case.conversation_id = Some(conversation.id.clone());
        case.lead_id = conversation.lead_id.clone();
        case.customer_id = conversation.customer_id.clone();
        case.escalation_reason = Some(reason);
        case.assigned_to = self.next_assignee("support", &self.config.routing.support_agents);
        self.store.insert_case(&case)?;

        conversation.escalated = true;
        conversation.escalation_reason = Some(reason);
        conversation.status = ConversationStatus::WaitingAgent;
        conversation.bot_handled = false;
        self.store.update_conversation(&conversation)?;

        info!(
            conversation_id,
            case_id = %case.id,
            reason = %reason,
            priority = case.priority,
            "Conversation escalated"
        );
        Ok(case)
    }
}
