//! Lead scoring.
//!
//! The LLM scores the lead from 0 to 100. The category is always derived
//! from the configured thresholds so that a model's own label can never
//! disagree with its score. Any failure yields a neutral warm score with
//! the error attached and nothing persisted.

use crate::error::{KernelError, KernelResult};
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::conversation::Channel;
use pulsecrm_types::lead::{Lead, LeadCategory, LeadClassification, LeadScore};
use pulsecrm_types::new_id;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You score sales leads for a retail business. \
Reply with JSON only: {\"score\": 0-100, \"category\": \"hot|warm|cold\", \
\"reasoning\": string, \"recommended_action\": string}.";

/// What is known about the sender besides the message itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub previous_interactions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub lead_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub sender_metadata: SenderMetadata,
}

#[derive(Debug, Deserialize)]
struct AiLeadScore {
    score: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    recommended_action: String,
}

fn build_prompt(req: &ClassifyRequest) -> String {
    let meta = &req.sender_metadata;
    let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
    format!(
        "Message: \"{}\"\nChannel: {}\nName: {}\nEmail: {}\nPhone: {}\nCompany: {}\n\
         Source: {}\nPrevious interactions: {}\n\n\
         Score purchase intent, budget signals, urgency and fit.",
        req.message,
        req.channel.unwrap_or(Channel::Unknown),
        or_na(&meta.name),
        or_na(&meta.email),
        or_na(&meta.phone),
        or_na(&meta.company),
        or_na(&meta.source),
        meta.previous_interactions,
    )
}

/// Score used whenever classification cannot complete.
pub fn fallback_score(lead_id: Option<String>, error: impl Into<String>) -> LeadScore {
    LeadScore {
        lead_id,
        score: 50,
        category: LeadCategory::Warm,
        reasoning: "Automatic classification unavailable".to_string(),
        recommended_action: "reclassify".to_string(),
        error: Some(error.into()),
    }
}

impl CrmKernel {
    /// Score a lead from an inbound message. Never fails: errors produce the
    /// fallback score.
    pub async fn classify_lead(&self, req: &ClassifyRequest) -> LeadScore {
        match self.try_classify(req).await {
            Ok(score) => score,
            Err(e) => {
                warn!(lead_id = ?req.lead_id, error = %e, "Lead classification failed, using fallback");
                fallback_score(req.lead_id.clone(), e.to_string())
            }
        }
    }

    async fn try_classify(&self, req: &ClassifyRequest) -> KernelResult<LeadScore> {
        if req.message.trim().is_empty() {
            return Err(KernelError::Invalid("message is empty".to_string()));
        }
        let ai = self.require_ai()?;
        let raw: AiLeadScore = ai
            .complete_json(SYSTEM_PROMPT, &build_prompt(req), 0.3, 500)
            .await?;

        if !raw.score.is_finite() || !(0.0..=100.0).contains(&raw.score) {
            return Err(KernelError::Invalid(format!(
                "score out of range: {}",
                raw.score
            )));
        }
        let score = raw.score.round() as u8;
        let scoring = &self.config.scoring;
        let category = LeadCategory::from_score(score, scoring.hot_threshold, scoring.warm_threshold);
        if let Some(claimed) = raw.category.as_deref() {
            if claimed.trim().to_ascii_lowercase() != category.as_str() {
                debug!(claimed, derived = %category, score, "Model category disagrees with score");
            }
        }

        let lead_id = self.persist_classification(req, score, category, &raw)?;
        info!(lead_id = %lead_id, score, category = %category, "Lead classified");

        Ok(LeadScore {
            lead_id: Some(lead_id),
            score,
            category,
            reasoning: raw.reasoning,
            recommended_action: raw.recommended_action,
            error: None,
        })
    }

    fn persist_classification(
        &self,
        req: &ClassifyRequest,
        score: u8,
        category: LeadCategory,
        raw: &AiLeadScore,
    ) -> KernelResult<String> {
        let now = Utc::now();
        let existing = match &req.lead_id {
            Some(id) => self.store.get_lead(id)?,
            None => None,
        };
        let meta = &req.sender_metadata;

        let lead_id = match existing {
            Some(mut lead) => {
                lead.score = score;
                lead.category = category;
                fill_missing(&mut lead.name, &meta.name);
                fill_missing(&mut lead.email, &meta.email);
                fill_missing(&mut lead.phone, &meta.phone);
                fill_missing(&mut lead.company, &meta.company);
                lead.updated_at = now;
                self.store.update_lead(&lead)?;
                lead.id
            }
            None => {
                let mut lead = Lead::new(req.channel.unwrap_or(Channel::Unknown), now);
                lead.name = meta.name.clone();
                lead.email = meta.email.clone();
                lead.phone = meta.phone.clone();
                lead.company = meta.company.clone();
                lead.score = score;
                lead.category = category;
                self.store.insert_lead(&lead)?;
                lead.id
            }
        };

        self.store.insert_classification(&LeadClassification {
            id: new_id(),
            lead_id: lead_id.clone(),
            score,
            category,
            reasoning: raw.reasoning.clone(),
            recommended_action: raw.recommended_action.clone(),
            ai_model: self.model_label(),
            created_at: now,
        })?;
        Ok(lead_id)
    }
}

fn fill_missing(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_kernel, ScriptedDriver};

    fn request(message: &str) -> ClassifyRequest {
        ClassifyRequest {
            lead_id: None,
            message: message.to_string(),
            channel: Some(Channel::Whatsapp),
            sender_metadata: SenderMetadata {
                name: Some("Ana".into()),
                email: Some("ana@example.com".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn creates_lead_and_recomputes_category() {
        let driver = ScriptedDriver::new(&[
            r#"Sure! {"score": 85, "category": "warm", "reasoning": "asks for price", "recommended_action": "call today"}"#,
        ]);
        let (kernel, _) = test_kernel(Some(driver));

        let result = kernel.classify_lead(&request("I want to buy 3 sofas")).await;
        assert_eq!(result.score, 85);
        assert_eq!(result.category, LeadCategory::Hot);
        assert!(result.error.is_none());

        let lead_id = result.lead_id.unwrap();
        let lead = kernel.store.get_lead(&lead_id).unwrap().unwrap();
        assert_eq!(lead.score, 85);
        assert_eq!(lead.email.as_deref(), Some("ana@example.com"));
        let history = kernel.store.list_classifications(&lead_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ai_model, "scripted-model");
    }

    #[tokio::test]
    async fn updates_existing_lead_and_appends_history() {
        let driver = ScriptedDriver::new(&[
            r#"{"score": 30, "reasoning": "browsing"}"#,
            r#"{"score": 60, "reasoning": "asked for a quote"}"#,
        ]);
        let (kernel, _) = test_kernel(Some(driver));

        let first = kernel.classify_lead(&request("just looking")).await;
        let lead_id = first.lead_id.clone().unwrap();
        assert_eq!(first.category, LeadCategory::Cold);

        let mut req = request("can you send a quote?");
        req.lead_id = Some(lead_id.clone());
        let second = kernel.classify_lead(&req).await;
        assert_eq!(second.lead_id.as_deref(), Some(lead_id.as_str()));
        assert_eq!(second.category, LeadCategory::Warm);

        assert_eq!(kernel.store.list_leads(10).unwrap().len(), 1);
        assert_eq!(kernel.store.list_classifications(&lead_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn out_of_range_score_falls_back_without_persisting() {
        let driver = ScriptedDriver::new(&[r#"{"score": 140}"#]);
        let (kernel, _) = test_kernel(Some(driver));

        let result = kernel.classify_lead(&request("hello")).await;
        assert_eq!(result.score, 50);
        assert_eq!(result.category, LeadCategory::Warm);
        assert_eq!(result.recommended_action, "reclassify");
        assert!(result.error.unwrap().contains("out of range"));
        assert!(kernel.store.list_leads(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_ai_falls_back() {
        let (kernel, _) = test_kernel(None);
        let result = kernel.classify_lead(&request("hello")).await;
        assert_eq!(result.score, 50);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back() {
        let driver = ScriptedDriver::new(&["I think this lead is great"]);
        let (kernel, _) = test_kernel(Some(driver));
        let result = kernel.classify_lead(&request("hello")).await;
        assert_eq!(result.score, 50);
        assert!(result.error.is_some());
    }
}
