//! Customer records and enrichment attributes.

use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Churned,
    Merged,
}

string_enum!(CustomerStatus {
    Active => "active",
    Inactive => "inactive",
    Churned => "churned",
    Merged => "merged",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Vip,
    Regular,
    AtRisk,
}

string_enum!(CustomerSegment {
    Vip => "vip",
    Regular => "regular",
    AtRisk => "at_risk",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasingPower {
    High,
    Medium,
    Low,
}

string_enum!(PurchasingPower {
    High => "high",
    Medium => "medium",
    Low => "low",
});

impl PurchasingPower {
    /// Bucket a predicted lifetime value.
    pub fn from_clv(clv: f64) -> Self {
        if clv > 10_000.0 {
            Self::High
        } else if clv > 5_000.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A converted lead or any contact with a purchase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub lead_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub predicted_clv: f64,
    pub purchasing_power: Option<PurchasingPower>,
    pub interests: Vec<String>,
    pub segment: CustomerSegment,
    pub total_purchases: u32,
    pub total_spent: f64,
    pub avg_order_value: f64,
    pub status: CustomerStatus,
    /// 0.0 to 1.0.
    pub churn_risk_score: f64,
    pub merged_into: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            lead_id: None,
            name: None,
            email: None,
            phone: None,
            company: None,
            job_title: None,
            location: None,
            predicted_clv: 0.0,
            purchasing_power: None,
            interests: Vec::new(),
            segment: CustomerSegment::Regular,
            total_purchases: 0,
            total_spent: 0.0,
            avg_order_value: 0.0,
            status: CustomerStatus::Active,
            churn_risk_score: 0.0,
            merged_into: None,
            enriched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn contact_address(&self) -> Option<&str> {
        self.phone.as_deref().or(self.email.as_deref())
    }
}
