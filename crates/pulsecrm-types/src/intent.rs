//! Message intent taxonomy.

use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purpose of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    PurchaseInquiry,
    ProductInfo,
    PricingQuestion,
    Complaint,
    SupportRequest,
    WarrantyClaim,
    DeliveryTracking,
    RefundRequest,
    Partnership,
    GeneralInquiry,
    Spam,
}

string_enum!(IntentType {
    PurchaseInquiry => "purchase_inquiry",
    ProductInfo => "product_info",
    PricingQuestion => "pricing_question",
    Complaint => "complaint",
    SupportRequest => "support_request",
    WarrantyClaim => "warranty_claim",
    DeliveryTracking => "delivery_tracking",
    RefundRequest => "refund_request",
    Partnership => "partnership",
    GeneralInquiry => "general_inquiry",
    Spam => "spam",
});

impl IntentType {
    pub const ALL: [IntentType; 11] = [
        Self::PurchaseInquiry,
        Self::ProductInfo,
        Self::PricingQuestion,
        Self::Complaint,
        Self::SupportRequest,
        Self::WarrantyClaim,
        Self::DeliveryTracking,
        Self::RefundRequest,
        Self::Partnership,
        Self::GeneralInquiry,
        Self::Spam,
    ];

    /// Parse loosely: case-insensitive, spaces and dashes accepted.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        normalized.parse().ok()
    }
}

/// Result of intent detection for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDetectionResult {
    pub primary_intent: IntentType,
    #[serde(default)]
    pub secondary_intents: Vec<IntentType>,
    pub confidence: f64,
    /// Extracted entities, e.g. `{"product": "sofa", "budget": "500"}`.
    #[serde(default)]
    pub entities: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentDetectionResult {
    /// Neutral result used when detection is unavailable.
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            primary_intent: IntentType::GeneralInquiry,
            secondary_intents: Vec::new(),
            confidence: 0.5,
            entities: serde_json::Map::new(),
            error: Some(error.into()),
        }
    }
}

/// Persisted intent detection tied to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadIntent {
    pub id: String,
    pub lead_id: String,
    pub message_id: Option<String>,
    pub primary_intent: IntentType,
    pub secondary_intents: Vec<IntentType>,
    pub confidence: f64,
    pub entities: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_parse_accepts_human_spelling() {
        assert_eq!(
            IntentType::parse_loose("Purchase Inquiry"),
            Some(IntentType::PurchaseInquiry)
        );
        assert_eq!(
            IntentType::parse_loose("warranty-claim"),
            Some(IntentType::WarrantyClaim)
        );
        assert_eq!(IntentType::parse_loose("chit_chat"), None);
    }

    #[test]
    fn fallback_is_general_inquiry() {
        let r = IntentDetectionResult::fallback("timeout");
        assert_eq!(r.primary_intent, IntentType::GeneralInquiry);
        assert_eq!(r.confidence, 0.5);
        assert_eq!(r.error.as_deref(), Some("timeout"));
    }
}
