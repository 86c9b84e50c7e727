//! Support cases, escalation reasons and closure decisions.

use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    WaitingCustomer,
    Resolved,
    Closed,
}

string_enum!(CaseStatus {
    Open => "open",
    InProgress => "in_progress",
    WaitingCustomer => "waiting_customer",
    Resolved => "resolved",
    Closed => "closed",
});

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

/// Why a conversation was handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscalationReason {
    #[serde(rename = "sentiment_score_below_threshold")]
    HighSentimentNegative,
    #[serde(rename = "bot_cannot_handle")]
    ComplexIssue,
    #[serde(rename = "customer_explicitly_asked")]
    CustomerRequest,
    #[serde(rename = "bot_failed_to_resolve")]
    FailedAttempts,
    #[serde(rename = "transaction_above_threshold")]
    HighValue,
    #[serde(rename = "legal_or_compliance_matter")]
    LegalIssue,
    #[serde(rename = "vip_customer_tier")]
    VipCustomer,
}

string_enum!(EscalationReason {
    HighSentimentNegative => "sentiment_score_below_threshold",
    ComplexIssue => "bot_cannot_handle",
    CustomerRequest => "customer_explicitly_asked",
    FailedAttempts => "bot_failed_to_resolve",
    HighValue => "transaction_above_threshold",
    LegalIssue => "legal_or_compliance_matter",
    VipCustomer => "vip_customer_tier",
});

impl EscalationReason {
    /// Case priority (1-5) assigned to an escalation of this kind.
    pub fn priority(&self) -> u8 {
        match self {
            Self::HighSentimentNegative => 5,
            Self::CustomerRequest => 4,
            Self::FailedAttempts => 4,
            Self::HighValue => 5,
            Self::LegalIssue => 5,
            Self::VipCustomer => 5,
            Self::ComplexIssue => 3,
        }
    }
}

/// A unit of human follow-up work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub conversation_id: Option<String>,
    pub lead_id: Option<String>,
    pub customer_id: Option<String>,
    pub subject: String,
    pub status: CaseStatus,
    pub priority: u8,
    pub escalation_reason: Option<EscalationReason>,
    pub assigned_to: Option<String>,
    pub resolution_time_hours: Option<f64>,
    pub closure_reason: Option<String>,
    pub csat: Option<u8>,
    pub predicted_csat: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Case {
    pub fn new(subject: impl Into<String>, priority: u8, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            conversation_id: None,
            lead_id: None,
            customer_id: None,
            subject: subject.into(),
            status: CaseStatus::Open,
            priority: priority.clamp(1, 5),
            escalation_reason: None,
            assigned_to: None,
            resolution_time_hours: None,
            closure_reason: None,
            csat: None,
            predicted_csat: None,
            created_at: now,
            closed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureType {
    CustomerConfirmed,
    AiDetected,
    NotReady,
}

/// Whether a case can be closed, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureDecision {
    pub should_close: bool,
    pub confidence: f64,
    pub reason: String,
    pub closure_type: ClosureType,
    pub requires_survey: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_reason_serializes_to_stored_value() {
        let json = serde_json::to_string(&EscalationReason::LegalIssue).unwrap();
        assert_eq!(json, "\"legal_or_compliance_matter\"");
        let parsed: EscalationReason = "vip_customer_tier".parse().unwrap();
        assert_eq!(parsed, EscalationReason::VipCustomer);
    }

    #[test]
    fn priority_map() {
        assert_eq!(EscalationReason::ComplexIssue.priority(), 3);
        assert_eq!(EscalationReason::CustomerRequest.priority(), 4);
        assert_eq!(EscalationReason::HighSentimentNegative.priority(), 5);
    }

    #[test]
    fn new_case_clamps_priority() {
        let case = Case::new("x", 9, Utc::now());
        assert_eq!(case.priority, 5);
        assert_eq!(case.status, CaseStatus::Open);
    }
}
