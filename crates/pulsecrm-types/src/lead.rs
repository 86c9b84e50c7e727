//! Lead records and scoring results.

use crate::conversation::Channel;
use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Qualified,
    Nurturing,
    Converted,
    Lost,
}

string_enum!(LeadStatus {
    New => "new",
    Qualified => "qualified",
    Nurturing => "nurturing",
    Converted => "converted",
    Lost => "lost",
});

/// Temperature bucket derived from a lead score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadCategory {
    Hot,
    Warm,
    Cold,
}

string_enum!(LeadCategory {
    Hot => "hot",
    Warm => "warm",
    Cold => "cold",
});

impl LeadCategory {
    /// Bucket a 0-100 score. Scores at or above `hot` are hot, at or above
    /// `warm` are warm, everything else is cold.
    pub fn from_score(score: u8, hot: u8, warm: u8) -> Self {
        if score >= hot {
            Self::Hot
        } else if score >= warm {
            Self::Warm
        } else {
            Self::Cold
        }
    }
}

/// A prospective customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    /// Platform-scoped sender id (WhatsApp number, PSID, IG user id).
    pub sender_id: Option<String>,
    pub score: u8,
    pub category: LeadCategory,
    pub status: LeadStatus,
    pub source: Channel,
    pub campaign_id: Option<String>,
    /// Follow-ups sent since the lead last replied.
    pub follow_up_count: u32,
    pub last_activity_at: DateTime<Utc>,
    pub nurturing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A new, unscored lead arriving from `source`.
    pub fn new(source: Channel, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            name: None,
            email: None,
            phone: None,
            company: None,
            sender_id: None,
            score: 0,
            category: LeadCategory::Cold,
            status: LeadStatus::New,
            source,
            campaign_id: None,
            follow_up_count: 0,
            last_activity_at: now,
            nurturing_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Best address to reach the lead on, preferring the platform sender id.
    pub fn contact_address(&self) -> Option<&str> {
        self.sender_id
            .as_deref()
            .or(self.phone.as_deref())
            .or(self.email.as_deref())
    }
}

/// Outcome of scoring a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub lead_id: Option<String>,
    pub score: u8,
    pub category: LeadCategory,
    pub reasoning: String,
    pub recommended_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Historical classification row; one per scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadClassification {
    pub id: String,
    pub lead_id: String,
    pub score: u8,
    pub category: LeadCategory,
    pub reasoning: String,
    pub recommended_action: String,
    pub ai_model: String,
    pub created_at: DateTime<Utc>,
}
