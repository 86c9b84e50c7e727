//! Sentiment analysis results.

use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

string_enum!(SentimentLabel {
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
});

impl SentimentLabel {
    /// Label implied by a score in [-1, 1].
    pub fn from_score(score: f64) -> Self {
        if score > 0.2 {
            Self::Positive
        } else if score < -0.2 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(UrgencyLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Emotional read of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: SentimentLabel,
    /// -1.0 (very negative) to 1.0 (very positive).
    pub score: f64,
    pub confidence: f64,
    #[serde(default)]
    pub emotions: Vec<String>,
    pub urgency: UrgencyLevel,
    /// 0 to 100.
    pub churn_risk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SentimentResult {
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.5,
            emotions: Vec::new(),
            urgency: UrgencyLevel::Low,
            churn_risk: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Persisted sentiment reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub id: String,
    pub lead_id: Option<String>,
    pub customer_id: Option<String>,
    pub message_id: Option<String>,
    pub sentiment: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    pub emotions: Vec<String>,
    pub urgency: UrgencyLevel,
    pub churn_risk: f64,
    pub ai_model: String,
    pub created_at: DateTime<Utc>,
}
