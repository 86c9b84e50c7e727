//! Sentiment analysis.

use crate::error::KernelResult;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::alert::{AlertSeverity, AlertType};
use pulsecrm_types::new_id;
use pulsecrm_types::sentiment::{SentimentAnalysis, SentimentLabel, SentimentResult, UrgencyLevel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You analyse the sentiment of customer messages. \
Reply with JSON only: {\"sentiment\": \"positive|neutral|negative\", \
\"score\": -1.0..1.0, \"confidence\": 0-1, \"emotions\": {\"anger\": 0-1, ...}, \
\"urgency\": \"low|medium|high|critical\", \"churn_risk\": 0-100}.";

/// Scores below this raise an angry-customer alert.
const ANGRY_THRESHOLD: f64 = -0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentRequest {
    pub message: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AiSentiment {
    #[serde(default)]
    sentiment: Option<String>,
    score: f64,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    emotions: Value,
    #[serde(default, alias = "urgency_level")]
    urgency: Option<String>,
    #[serde(default)]
    churn_risk: Option<f64>,
}

/// Emotions arrive either as a list of names or as a name → intensity map;
/// maps are ordered by intensity, strongest first.
fn emotion_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => {
            let mut scored: Vec<(&String, f64)> = map
                .iter()
                .map(|(k, v)| (k, v.as_f64().unwrap_or(0.0)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.into_iter().map(|(k, _)| k.clone()).collect()
        }
        _ => Vec::new(),
    }
}

fn normalize(raw: AiSentiment) -> SentimentResult {
    let score = if raw.score.is_finite() {
        raw.score.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let sentiment = raw
        .sentiment
        .as_deref()
        .and_then(|s| s.trim().to_ascii_lowercase().parse::<SentimentLabel>().ok())
        .unwrap_or_else(|| SentimentLabel::from_score(score));
    let urgency = raw
        .urgency
        .as_deref()
        .and_then(|u| u.trim().to_ascii_lowercase().parse::<UrgencyLevel>().ok())
        .unwrap_or(UrgencyLevel::Low);
    SentimentResult {
        sentiment,
        score,
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        emotions: emotion_names(&raw.emotions),
        urgency,
        churn_risk: raw.churn_risk.unwrap_or(0.0).clamp(0.0, 100.0),
        error: None,
    }
}

impl CrmKernel {
    /// Analyse the emotional tone of a message. Failures yield a neutral
    /// reading with the error attached.
    pub async fn analyze_sentiment(&self, req: &SentimentRequest) -> SentimentResult {
        let result = match self.try_analyze_sentiment(req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Sentiment analysis failed, using fallback");
                return SentimentResult::fallback(e.to_string());
            }
        };

        if let Err(e) = self.persist_sentiment(req, &result) {
            warn!(error = %e, "Failed to persist sentiment analysis");
        }
        if result.score < ANGRY_THRESHOLD {
            self.flag_angry_customer(req, &result);
        }
        result
    }

    async fn try_analyze_sentiment(&self, req: &SentimentRequest) -> KernelResult<SentimentResult> {
        let ai = self.require_ai()?;
        let raw: AiSentiment = ai
            .complete_json(SYSTEM_PROMPT, &format!("Message: \"{}\"", req.message), 0.2, 400)
            .await?;
        let result = normalize(raw);
        info!(
            sentiment = %result.sentiment,
            score = result.score,
            churn_risk = result.churn_risk,
            "Sentiment analysed"
        );
        Ok(result)
    }

    fn persist_sentiment(&self, req: &SentimentRequest, result: &SentimentResult) -> KernelResult<()> {
        self.store.insert_sentiment(&SentimentAnalysis {
            id: new_id(),
            lead_id: req.lead_id.clone(),
            customer_id: req.customer_id.clone(),
            message_id: req.message_id.clone(),
            sentiment: result.sentiment,
            score: result.score,
            confidence: result.confidence,
            emotions: result.emotions.clone(),
            urgency: result.urgency,
            churn_risk: result.churn_risk,
            ai_model: self.model_label(),
            created_at: Utc::now(),
        })?;
        Ok(())
    }

    fn flag_angry_customer(&self, req: &SentimentRequest, result: &SentimentResult) {
        let subject = req
            .customer_id
            .clone()
            .or_else(|| req.lead_id.clone())
            .or_else(|| req.message_id.clone());
        let raised = self.raise_alert(
            AlertType::AngryCustomer,
            AlertSeverity::High,
            format!("Very negative message (score {:.2})", result.score),
            subject,
            json!({
                "lead_id": req.lead_id,
                "customer_id": req.customer_id,
                "message_id": req.message_id,
                "score": result.score,
                "emotions": result.emotions,
            }),
        );
        if let Err(e) = raised {
            warn!(error = %e, "Failed to raise angry-customer alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_kernel, ScriptedDriver};
    use pulsecrm_types::alert::AlertStatus;

    fn req(lead: &str) -> SentimentRequest {
        SentimentRequest {
            message: "x".into(),
            lead_id: Some(lead.into()),
            customer_id: None,
            message_id: None,
        }
    }

    #[test]
    fn emotion_map_sorted_by_intensity() {
        let v = json!({"joy": 0.1, "anger": 0.9, "fear": 0.4});
        assert_eq!(emotion_names(&v), vec!["anger", "fear", "joy"]);
        assert_eq!(emotion_names(&json!(["sad", 3])), vec!["sad"]);
        assert!(emotion_names(&Value::Null).is_empty());
    }

    #[test]
    fn normalize_clamps_and_accepts_urgency_alias() {
        let raw: AiSentiment = serde_json::from_value(json!({
            "score": -3.0, "confidence": 2.0, "urgency_level": "HIGH", "churn_risk": 250
        }))
        .unwrap();
        let r = normalize(raw);
        assert_eq!(r.score, -1.0);
        assert_eq!(r.sentiment, SentimentLabel::Negative);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.urgency, UrgencyLevel::High);
        assert_eq!(r.churn_risk, 100.0);
    }

    #[tokio::test]
    async fn very_negative_message_raises_one_alert() {
        let reply = r#"{"sentiment": "negative", "score": -0.9, "confidence": 0.8, "emotions": ["anger"], "urgency": "high", "churn_risk": 85}"#;
        let driver = ScriptedDriver::new(&[reply, reply]);
        let (kernel, _) = test_kernel(Some(driver));

        let r = kernel.analyze_sentiment(&req("lead-1")).await;
        assert_eq!(r.sentiment, SentimentLabel::Negative);
        kernel.analyze_sentiment(&req("lead-1")).await;

        assert_eq!(kernel.store.sentiments_for_lead("lead-1", 10).unwrap().len(), 2);
        let alerts = kernel.store.list_alerts(Some(AlertStatus::Active), 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::AngryCustomer);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
    }

    #[tokio::test]
    async fn fallback_is_neutral() {
        let (kernel, _) = test_kernel(None);
        let r = kernel.analyze_sentiment(&req("lead-1")).await;
        assert_eq!(r.sentiment, SentimentLabel::Neutral);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.confidence, 0.5);
        assert_eq!(r.urgency, UrgencyLevel::Low);
        assert!(kernel.store.sentiments_for_lead("lead-1", 10).unwrap().is_empty());
    }
}
