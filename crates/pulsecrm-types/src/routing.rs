//! Routing decisions and chatbot replies.

use crate::string_enum;
use serde::{Deserialize, Serialize};

/// Who handles a message next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    SalesTeam,
    RetentionSpecialist,
    SupportTeam,
    Chatbot,
    AutoReject,
}

string_enum!(Destination {
    SalesTeam => "sales_team",
    RetentionSpecialist => "retention_specialist",
    SupportTeam => "support_team",
    Chatbot => "chatbot",
    AutoReject => "auto_reject",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub destination: Destination,
    /// 1 (lowest) to 5 (highest).
    pub priority: u8,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// Reply produced by the chatbot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    /// Follow-up action requested by the bot, e.g. `escalate_to_human`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
