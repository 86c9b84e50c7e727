//! Operational alerts raised by the monitoring job and services.

use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SalesDrop,
    AngryCustomer,
    ChurnRisk,
    HotLead,
    InventoryLow,
    CompetitorMention,
    PaymentOverdue,
}

string_enum!(AlertType {
    SalesDrop => "sales_drop",
    AngryCustomer => "angry_customer",
    ChurnRisk => "churn_risk",
    HotLead => "hot_lead",
    InventoryLow => "inventory_low",
    CompetitorMention => "competitor_mention",
    PaymentOverdue => "payment_overdue",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(AlertSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

string_enum!(AlertStatus {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    /// Entity the alert is about (customer id, invoice id, ...). Used to
    /// avoid raising the same alert twice while it is still active.
    pub subject_key: Option<String>,
    pub data: serde_json::Value,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        subject_key: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: crate::new_id(),
            alert_type,
            severity,
            message: message.into(),
            subject_key,
            data,
            status: AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }
}
