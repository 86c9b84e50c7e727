use crate::string_enum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseLikelihood {
    VeryHigh,
    High,
    Medium,
    Low,
}

string_enum!(CloseLikelihood {
    VeryHigh => "very_high",
    High => "high",
    Medium => "medium",
    Low => "low",
});

/// Features the close-probability model is fed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    /// 0-100.
    pub lead_score: f64,
    /// 0.0-1.0.
    #[serde(default)]
    pub engagement_score: f64,
    /// -1.0 to 1.0.
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub interaction_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePrediction {
    /// Percentage, 0-100, two decimals.
    pub probability: f64,
    pub likelihood: CloseLikelihood,
    pub recommendation: String,
    pub key_factors: Vec<String>,
}
