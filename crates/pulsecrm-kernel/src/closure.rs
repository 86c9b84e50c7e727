//! Automatic case closure.

use crate::error::{KernelError, KernelResult};
use crate::text::contains_any;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::case::{Case, CaseStatus, ClosureDecision, ClosureType};
use pulsecrm_types::conversation::{ConversationStatus, Conversation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const CONFIRMATION_PHRASES: &[&str] = &[
    "todo bien",
    "resuelto",
    "gracias, perfecto",
    "gracias perfecto",
    "ya está solucionado",
    "no necesito nada más",
    "all good",
    "problem solved",
    "that's all i needed",
];

/// AI decisions must be more confident than this to close a case.
const AI_CLOSE_CONFIDENCE: f64 = 0.8;

const SYSTEM_PROMPT: &str = "You review customer support cases. Decide whether the \
customer's latest message shows the problem is solved. Reply with JSON only: \
{\"should_close\": bool, \"confidence\": 0-1, \"reason\": string}.";

const CONFIRMATION_FALLBACK: &str =
    "¿Podemos dar por resuelto tu caso? Si necesitas algo más, responde a este mensaje y lo reabrimos.";

const SURVEY_MESSAGE: &str =
    "Tu caso ha sido cerrado. ¿Cómo calificarías la atención recibida del 1 al 5?";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureRequest {
    pub case_id: String,
    pub latest_message: String,
}

#[derive(Debug, Deserialize)]
struct AiClosure {
    #[serde(default)]
    should_close: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reason: String,
}

fn not_ready(reason: &str) -> ClosureDecision {
    ClosureDecision {
        should_close: false,
        confidence: 0.0,
        reason: reason.to_string(),
        closure_type: ClosureType::NotReady,
        requires_survey: false,
    }
}

impl CrmKernel {
    /// Decide whether a case can be closed from the customer's latest
    /// message, and close it when the answer is yes.
    pub async fn evaluate_closure(&self, req: &ClosureRequest) -> KernelResult<ClosureDecision> {
        let case = self
            .store
            .get_case(&req.case_id)?
            .ok_or_else(|| KernelError::not_found("case", &req.case_id))?;
        if case.status.is_terminal() {
            return Ok(not_ready("Case is already closed"));
        }

        if contains_any(&req.latest_message, CONFIRMATION_PHRASES) {
            let decision = ClosureDecision {
                should_close: true,
                confidence: 0.95,
                reason: "Customer explicitly confirmed the resolution".to_string(),
                closure_type: ClosureType::CustomerConfirmed,
                requires_survey: true,
            };
            self.close_case(&case.id, &decision.reason, decision.requires_survey)
                .await?;
            return Ok(decision);
        }

        if self.ai.is_none() {
            return Ok(not_ready("Needs more interaction"));
        }
        let verdict = match self.ai_closure_verdict(&case, &req.latest_message).await {
            Ok(v) => v,
            Err(e) => {
                warn!(case_id = %case.id, error = %e, "AI closure evaluation failed");
                return Ok(not_ready("Needs more interaction"));
            }
        };
        if !(verdict.should_close && verdict.confidence > AI_CLOSE_CONFIDENCE) {
            return Ok(ClosureDecision {
                confidence: verdict.confidence.clamp(0.0, 1.0),
                ..not_ready("Needs more interaction")
            });
        }

        self.send_closure_confirmation(&case).await;
        let decision = ClosureDecision {
            should_close: true,
            confidence: verdict.confidence.clamp(0.0, 1.0),
            reason: if verdict.reason.is_empty() {
                "Resolution detected in conversation".to_string()
            } else {
                verdict.reason
            },
            closure_type: ClosureType::AiDetected,
            requires_survey: true,
        };
        self.close_case(&case.id, &decision.reason, decision.requires_survey)
            .await?;
        Ok(decision)
    }

    async fn ai_closure_verdict(&self, case: &Case, latest: &str) -> KernelResult<AiClosure> {
        let ai = self.require_ai()?;
        let prompt = format!("Case: {}\nLatest customer message: \"{latest}\"", case.subject);
        Ok(ai.complete_json(SYSTEM_PROMPT, &prompt, 0.2, 200).await?)
    }

    /// Ask the customer to confirm before the case disappears from their view.
    async fn send_closure_confirmation(&self, case: &Case) {
        let Some(conversation) = self.case_conversation(case) else {
            return;
        };
        let text = match self.require_ai() {
            Ok(ai) => ai
                .complete_text(
                    "Write one short, friendly message in Spanish asking the customer to confirm \
                     their problem is solved, offering to reopen the case if needed.",
                    &format!("Case: {}", case.subject),
                    0.7,
                    150,
                )
                .await
                .unwrap_or_else(|e| {
                    warn!(case_id = %case.id, error = %e, "Confirmation text generation failed");
                    CONFIRMATION_FALLBACK.to_string()
                }),
            Err(_) => CONFIRMATION_FALLBACK.to_string(),
        };
        self.message_conversation(&conversation, &text).await;
        info!(case_id = %case.id, "Closure confirmation sent");
    }

    /// Close a case, record how long it took, resolve its conversation and
    /// optionally send the satisfaction survey.
    pub async fn close_case(&self, case_id: &str, reason: &str, send_survey: bool) -> KernelResult<Case> {
        let mut case = self
            .store
            .get_case(case_id)?
            .ok_or_else(|| KernelError::not_found("case", case_id))?;
        if case.status == CaseStatus::Closed {
            return Ok(case);
        }
        let now = Utc::now();
        let hours = (now - case.created_at).num_seconds() as f64 / 3600.0;
        case.status = CaseStatus::Closed;
        case.closed_at = Some(now);
        case.closure_reason = Some(reason.to_string());
        case.resolution_time_hours = Some((hours * 100.0).round() / 100.0);
        self.store.update_case(&case)?;

        let conversation = self.case_conversation(&case);
        if let Some(mut conv) = conversation.clone() {
            conv.status = ConversationStatus::Resolved;
            conv.closed_at = Some(now);
            self.store.update_conversation(&conv)?;
        }
        if send_survey {
            if let Some(conv) = &conversation {
                self.message_conversation(conv, SURVEY_MESSAGE).await;
            }
        }

        info!(
            case_id,
            resolution_time_hours = case.resolution_time_hours,
            "Case closed"
        );
        Ok(case)
    }

    fn case_conversation(&self, case: &Case) -> Option<Conversation> {
        let id = case.conversation_id.as_deref()?;
        match self.store.get_conversation(id) {
            Ok(conv) => conv,
            Err(e) => {
                warn!(case_id = %case.id, error = %e, "Failed to load case conversation");
                None
            }
        }
    }

    /// Best-effort message to the other side of a conversation.
    async fn message_conversation(&self, conversation: &Conversation, text: &str) {
        let recipient = match self.conversation_recipient(conversation) {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(conversation_id = %conversation.id, "No address to reach the customer");
                return;
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Recipient lookup failed");
                return;
            }
        };
        if let Err(e) = self.send_text(conversation.channel, &recipient, text).await {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to message customer");
        }
    }
}
