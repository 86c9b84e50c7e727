//! Marketing content and scheduled outbound messages.

use crate::conversation::Channel;
use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Social platform content is generated for and published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Facebook,
    Tiktok,
}

string_enum!(Platform {
    Instagram => "instagram",
    Facebook => "facebook",
    Tiktok => "tiktok",
});

impl Platform {
    /// Copy length limit and tone used when writing for this platform.
    pub fn guidelines(&self) -> (usize, &'static str) {
        match self {
            Self::Instagram => (150, "visual, emoji-friendly, inspiring"),
            Self::Facebook => (250, "conversational, community oriented"),
            Self::Tiktok => (100, "casual, playful, trend aware"),
        }
    }

    /// Local hour with the best engagement for this platform.
    pub fn best_hour(&self) -> u32 {
        match self {
            Self::Instagram => 18,
            Self::Facebook => 15,
            Self::Tiktok => 19,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

string_enum!(ContentStatus {
    Draft => "draft",
    Scheduled => "scheduled",
    Published => "published",
    Failed => "failed",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: String,
    pub content_type: String,
    pub platform: Platform,
    pub topic: String,
    pub asset_url: Option<String>,
    pub copy: String,
    pub hashtags: Vec<String>,
    pub status: ContentStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

string_enum!(DeliveryStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
    Cancelled => "cancelled",
});

/// An outbound message queued for a future send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub lead_id: Option<String>,
    pub customer_id: Option<String>,
    pub channel: Channel,
    pub recipient: String,
    pub body: String,
    pub campaign: Option<String>,
    pub send_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Where a lead sits in the buying journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    Awareness,
    Consideration,
    Decision,
}

string_enum!(JourneyStage {
    Awareness => "awareness",
    Consideration => "consideration",
    Decision => "decision",
});

impl JourneyStage {
    pub fn from_score(score: u8) -> Self {
        if score > 70 {
            Self::Decision
        } else if score > 40 {
            Self::Consideration
        } else {
            Self::Awareness
        }
    }
}
