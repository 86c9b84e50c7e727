//! Sales-close probability.

use crate::error::KernelResult;
use crate::CrmKernel;
use pulsecrm_types::prediction::{CloseLikelihood, ClosePrediction, PredictionInput};
use tracing::info;

const LEAD_SCORE_WEIGHT: f64 = 40.0;
const ENGAGEMENT_WEIGHT: f64 = 30.0;
const SENTIMENT_WEIGHT: f64 = 20.0;
const INTERACTION_WEIGHT: f64 = 10.0;
/// Interactions beyond this count add nothing.
const INTERACTION_CAP: f64 = 10.0;
/// Follow-ups after which a lead counts as fully unresponsive.
const UNRESPONSIVE_FOLLOW_UPS: f64 = 3.0;
const SENTIMENT_SAMPLE: usize = 20;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Weighted sum of normalised features, 0-100.
pub fn predict_close(input: &PredictionInput) -> ClosePrediction {
    let lead = (input.lead_score / 100.0).clamp(0.0, 1.0);
    let engagement = input.engagement_score.clamp(0.0, 1.0);
    let sentiment = input.sentiment_score.clamp(-1.0, 1.0);
    let interactions = (input.interaction_count as f64 / INTERACTION_CAP).min(1.0);

    let probability = lead * LEAD_SCORE_WEIGHT
        + engagement * ENGAGEMENT_WEIGHT
        + (sentiment + 1.0) / 2.0 * SENTIMENT_WEIGHT
        + interactions * INTERACTION_WEIGHT;

    let (likelihood, recommendation) = if probability > 80.0 {
        (CloseLikelihood::VeryHigh, "Prioritise: ready to close")
    } else if probability > 60.0 {
        (CloseLikelihood::High, "Push towards closing this week")
    } else if probability > 40.0 {
        (CloseLikelihood::Medium, "Keep nurturing, do not force the close")
    } else {
        (CloseLikelihood::Low, "Requalify or move to long-term nurturing")
    };

    let mut key_factors = Vec::new();
    if lead > 0.8 {
        key_factors.push("high_lead_score".to_string());
    }
    if engagement > 0.7 {
        key_factors.push("high_engagement".to_string());
    }
    if sentiment > 0.5 {
        key_factors.push("positive_sentiment".to_string());
    }
    key_factors.truncate(3);

    ClosePrediction {
        probability: round2(probability),
        likelihood,
        recommendation: recommendation.to_string(),
        key_factors,
    }
}

impl CrmKernel {
    /// Predict from features assembled out of a stored lead: its score,
    /// mean recent sentiment, message count and responsiveness to follow-ups.
    pub fn predict_for_lead(&self, lead_id: &str) -> KernelResult<ClosePrediction> {
        let lead = self.lead(lead_id)?;
        let sentiments = self.store.sentiments_for_lead(lead_id, SENTIMENT_SAMPLE)?;
        let sentiment_score = if sentiments.is_empty() {
            0.0
        } else {
            sentiments.iter().map(|s| s.score).sum::<f64>() / sentiments.len() as f64
        };
        let interaction_count = self
            .store
            .conversations_for_lead(lead_id)?
            .iter()
            .map(|c| c.message_count)
            .sum();
        let engagement_score =
            (1.0 - lead.follow_up_count as f64 / UNRESPONSIVE_FOLLOW_UPS).clamp(0.0, 1.0);

        let input = PredictionInput {
            lead_score: lead.score as f64,
            engagement_score,
            sentiment_score,
            interaction_count,
        };
        let prediction = predict_close(&input);
        info!(
            lead_id,
            probability = prediction.probability,
            likelihood = %prediction.likelihood,
            "Close probability predicted"
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use chrono::Utc;
    use pulsecrm_types::conversation::{Channel, Conversation};
    use pulsecrm_types::lead::Lead;

    fn input(score: f64, engagement: f64, sentiment: f64, interactions: u32) -> PredictionInput {
        PredictionInput {
            lead_score: score,
            engagement_score: engagement,
            sentiment_score: sentiment,
            interaction_count: interactions,
        }
    }

    #[test]
    fn weighted_sum_and_bands() {
        let p = predict_close(&input(90.0, 0.8, 0.6, 12));
        // 36 + 24 + 16 + 10
        assert_eq!(p.probability, 86.0);
        assert_eq!(p.likelihood, CloseLikelihood::VeryHigh);
        assert_eq!(p.key_factors, vec!["high_lead_score", "high_engagement", "positive_sentiment"]);

        let p = predict_close(&input(50.0, 0.5, 0.0, 0));
        // 20 + 15 + 10 + 0
        assert_eq!(p.probability, 45.0);
        assert_eq!(p.likelihood, CloseLikelihood::Medium);
        assert!(p.key_factors.is_empty());

        let p = predict_close(&input(0.0, 0.0, -1.0, 0));
        assert_eq!(p.probability, 0.0);
        assert_eq!(p.likelihood, CloseLikelihood::Low);
    }

    #[test]
    fn band_edges_are_exclusive() {
        // 40 + 30 + 10 + 0 = 80 is still "high".
        assert_eq!(predict_close(&input(100.0, 1.0, 0.0, 0)).likelihood, CloseLikelihood::High);
        assert_eq!(predict_close(&input(100.0, 1.0, 0.0, 1)).likelihood, CloseLikelihood::VeryHigh);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let p = predict_close(&input(33.333, 0.0, -1.0, 0));
        assert_eq!(p.probability, 13.33);
    }

    #[test]
    fn features_from_stored_lead() {
        let (kernel, _) = test_kernel(None);
        let mut lead = Lead::new(Channel::Whatsapp, Utc::now());
        lead.score = 85;
        kernel.store.insert_lead(&lead).unwrap();
        let mut conv = Conversation::new(Channel::Whatsapp, Utc::now());
        conv.lead_id = Some(lead.id.clone());
        conv.message_count = 5;
        kernel.store.insert_conversation(&conv).unwrap();

        let p = kernel.predict_for_lead(&lead.id).unwrap();
        // 34 + 30 + 10 + 5
        assert_eq!(p.probability, 79.0);
        assert!(p.key_factors.contains(&"high_lead_score".to_string()));

        assert!(kernel.predict_for_lead("missing").unwrap_err().is_not_found());
    }
}
