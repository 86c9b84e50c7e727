//! Intelligent router: a fixed decision table over intent, lead
//! score and sentiment.

use crate::CrmKernel;
use pulsecrm_types::intent::IntentType;
use pulsecrm_types::routing::{Destination, RoutingDecision};
use pulsecrm_types::sentiment::SentimentLabel;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub intent: IntentType,
    #[serde(default)]
    pub lead_score: u8,
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub churn_risk: f64,
    #[serde(default)]
    pub sentiment: Option<SentimentLabel>,
    #[serde(default)]
    pub lead_id: Option<String>,
}

/// Apply the routing table. Rules are evaluated in order; the first match wins.
pub fn decide_route(
    intent: IntentType,
    lead_score: u8,
    sentiment_score: f64,
    churn_risk: f64,
    sentiment: SentimentLabel,
) -> RoutingDecision {
    let (destination, priority, reasoning) = if intent == IntentType::PurchaseInquiry && lead_score > 80 {
        (Destination::SalesTeam, 5, "Hot lead with purchase intent")
    } else if sentiment_score < -0.6 && churn_risk > 70.0 {
        (Destination::RetentionSpecialist, 5, "Unhappy customer at risk of churning")
    } else if matches!(intent, IntentType::Complaint | IntentType::WarrantyClaim) {
        (Destination::SupportTeam, 4, "Complaint or warranty claim needs support")
    } else if matches!(intent, IntentType::ProductInfo | IntentType::PricingQuestion)
        && sentiment != SentimentLabel::Negative
    {
        (Destination::Chatbot, 2, "Informational question the bot can answer")
    } else if intent == IntentType::Spam {
        (Destination::AutoReject, 1, "Spam")
    } else {
        (Destination::Chatbot, 3, "Default handling by the bot")
    };
    RoutingDecision {
        destination,
        priority,
        reasoning: reasoning.to_string(),
        assigned_to: None,
    }
}

impl CrmKernel {
    /// Route a message and, for human destinations, pick the next agent.
    pub fn route(&self, req: &RouteRequest) -> RoutingDecision {
        let label = req
            .sentiment
            .unwrap_or_else(|| SentimentLabel::from_score(req.sentiment_score));
        let mut decision = decide_route(
            req.intent,
            req.lead_score,
            req.sentiment_score,
            req.churn_risk,
            label,
        );
        let routing = &self.config.routing;
        decision.assigned_to = match decision.destination {
            Destination::SalesTeam => self.next_assignee("sales", &routing.sales_agents),
            Destination::RetentionSpecialist => {
                self.next_assignee("retention", &routing.retention_specialists)
            }
            _ => None,
        };
        info!(
            lead_id = ?req.lead_id,
            destination = %decision.destination,
            priority = decision.priority,
            assigned_to = ?decision.assigned_to,
            "Message routed"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_kernel_with};

    fn route(intent: IntentType, score: u8, sentiment: f64, churn: f64) -> RoutingDecision {
        decide_route(intent, score, sentiment, churn, SentimentLabel::from_score(sentiment))
    }

    #[test]
    fn hot_purchase_goes_to_sales() {
        let d = route(IntentType::PurchaseInquiry, 81, 0.0, 0.0);
        assert_eq!(d.destination, Destination::SalesTeam);
        assert_eq!(d.priority, 5);
        // 80 is not above the bar.
        let d = route(IntentType::PurchaseInquiry, 80, 0.0, 0.0);
        assert_eq!(d.destination, Destination::Chatbot);
        assert_eq!(d.priority, 3);
    }

    #[test]
    fn churn_risk_beats_complaint() {
        let d = route(IntentType::Complaint, 10, -0.8, 75.0);
        assert_eq!(d.destination, Destination::RetentionSpecialist);
        let d = route(IntentType::Complaint, 10, -0.8, 70.0);
        assert_eq!(d.destination, Destination::SupportTeam);
        assert_eq!(d.priority, 4);
    }

    #[test]
    fn informational_questions_depend_on_mood() {
        let d = route(IntentType::PricingQuestion, 50, 0.1, 0.0);
        assert_eq!((d.destination, d.priority), (Destination::Chatbot, 2));
        let d = route(IntentType::PricingQuestion, 50, -0.5, 0.0);
        assert_eq!((d.destination, d.priority), (Destination::Chatbot, 3));
    }

    #[test]
    fn spam_is_rejected() {
        let d = route(IntentType::Spam, 0, 0.0, 0.0);
        assert_eq!((d.destination, d.priority), (Destination::AutoReject, 1));
    }

    #[test]
    fn human_destinations_rotate_through_roster() {
        let mut config = test_config();
        config.routing.sales_agents = vec!["ana".into(), "luis".into()];
        let (kernel, _) = test_kernel_with(config, None);
        let req = RouteRequest {
            intent: IntentType::PurchaseInquiry,
            lead_score: 95,
            sentiment_score: 0.4,
            churn_risk: 0.0,
            sentiment: None,
            lead_id: None,
        };
        assert_eq!(kernel.route(&req).assigned_to.as_deref(), Some("ana"));
        assert_eq!(kernel.route(&req).assigned_to.as_deref(), Some("luis"));

        let support = RouteRequest {
            intent: IntentType::Complaint,
            ..req
        };
        assert_eq!(kernel.route(&support).assigned_to, None);
    }
}
