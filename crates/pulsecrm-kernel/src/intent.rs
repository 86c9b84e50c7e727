//! Intent detection.

use crate::error::KernelResult;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::intent::{IntentDetectionResult, IntentType, LeadIntent};
use pulsecrm_types::new_id;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You detect the intent of customer messages. \
Valid intents: purchase_inquiry, product_info, pricing_question, complaint, \
support_request, warranty_claim, delivery_tracking, refund_request, partnership, \
general_inquiry, spam. Reply with JSON only: {\"primary_intent\": string, \
\"secondary_intents\": [string], \"confidence\": 0-1, \"entities\": object}.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub message: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    /// Free-text context, e.g. the previous turns.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AiIntent {
    #[serde(default)]
    primary_intent: String,
    #[serde(default)]
    secondary_intents: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    entities: serde_json::Map<String, serde_json::Value>,
}

fn normalize(raw: AiIntent) -> IntentDetectionResult {
    let primary = IntentType::parse_loose(&raw.primary_intent).unwrap_or(IntentType::GeneralInquiry);
    let mut secondary: Vec<IntentType> = Vec::new();
    for intent in raw.secondary_intents.iter().filter_map(|s| IntentType::parse_loose(s)) {
        if intent != primary && !secondary.contains(&intent) {
            secondary.push(intent);
        }
    }
    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    IntentDetectionResult {
        primary_intent: primary,
        secondary_intents: secondary,
        confidence,
        entities: raw.entities,
        error: None,
    }
}

impl CrmKernel {
    /// Detect the purpose of a message. Failures yield `general_inquiry`.
    pub async fn detect_intent(&self, req: &IntentRequest) -> IntentDetectionResult {
        let result = match self.try_detect_intent(req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Intent detection failed, using fallback");
                IntentDetectionResult::fallback(e.to_string())
            }
        };

        if result.error.is_none() {
            if let Some(lead_id) = &req.lead_id {
                if let Err(e) = self.persist_intent(lead_id, req.message_id.clone(), &result) {
                    warn!(lead_id = %lead_id, error = %e, "Failed to persist intent");
                }
            }
        }
        result
    }

    async fn try_detect_intent(&self, req: &IntentRequest) -> KernelResult<IntentDetectionResult> {
        let ai = self.require_ai()?;
        let mut prompt = format!("Message: \"{}\"", req.message);
        if let Some(ctx) = req.context.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nContext: {ctx}"));
        }
        let raw: AiIntent = ai.complete_json(SYSTEM_PROMPT, &prompt, 0.2, 400).await?;
        let result = normalize(raw);
        info!(
            intent = %result.primary_intent,
            confidence = result.confidence,
            "Intent detected"
        );
        Ok(result)
    }

    fn persist_intent(
        &self,
        lead_id: &str,
        message_id: Option<String>,
        result: &IntentDetectionResult,
    ) -> KernelResult<()> {
        if self.store.get_lead(lead_id)?.is_none() {
            warn!(lead_id, "Intent not stored: unknown lead");
            return Ok(());
        }
        self.store.insert_intent(&LeadIntent {
            id: new_id(),
            lead_id: lead_id.to_string(),
            message_id,
            primary_intent: result.primary_intent,
            secondary_intents: result.secondary_intents.clone(),
            confidence: result.confidence,
            entities: result.entities.clone(),
            created_at: Utc::now(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_kernel, ScriptedDriver};
    use pulsecrm_types::conversation::Channel;
    use pulsecrm_types::lead::Lead;

    fn req(message: &str, lead_id: Option<String>) -> IntentRequest {
        IntentRequest {
            message: message.into(),
            lead_id,
            message_id: None,
            context: None,
        }
    }

    #[test]
    fn normalize_cleans_model_output() {
        let raw = AiIntent {
            primary_intent: "Teleport Request".into(),
            secondary_intents: vec![
                "pricing question".into(),
                "nonsense".into(),
                "pricing_question".into(),
            ],
            confidence: Some(1.7),
            entities: Default::default(),
        };
        let r = normalize(raw);
        assert_eq!(r.primary_intent, IntentType::GeneralInquiry);
        assert_eq!(r.secondary_intents, vec![IntentType::PricingQuestion]);
        assert_eq!(r.confidence, 1.0);
    }

    #[tokio::test]
    async fn persists_for_known_lead() {
        let driver = ScriptedDriver::new(&[
            r#"{"primary_intent": "purchase_inquiry", "secondary_intents": ["pricing_question"], "confidence": 0.92, "entities": {"product": "sofa"}}"#,
        ]);
        let (kernel, _) = test_kernel(Some(driver));
        let lead = Lead::new(Channel::Whatsapp, Utc::now());
        kernel.store.insert_lead(&lead).unwrap();

        let r = kernel
            .detect_intent(&req("How much for the grey sofa?", Some(lead.id.clone())))
            .await;
        assert_eq!(r.primary_intent, IntentType::PurchaseInquiry);
        assert_eq!(r.entities["product"], "sofa");

        let stored = kernel.store.intents_for_lead(&lead.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].confidence, 0.92);
    }

    #[tokio::test]
    async fn failure_is_general_inquiry_and_not_stored() {
        let (kernel, _) = test_kernel(Some(ScriptedDriver::failing(500)));
        let lead = Lead::new(Channel::Whatsapp, Utc::now());
        kernel.store.insert_lead(&lead).unwrap();

        let r = kernel.detect_intent(&req("hola", Some(lead.id.clone()))).await;
        assert_eq!(r.primary_intent, IntentType::GeneralInquiry);
        assert_eq!(r.confidence, 0.5);
        assert!(r.error.is_some());
        assert!(kernel.store.intents_for_lead(&lead.id).unwrap().is_empty());
    }
}
