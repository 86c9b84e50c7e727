//! Channels, conversations and the messages exchanged in them.

use crate::case::EscalationReason;
use crate::intent::IntentType;
use crate::sentiment::SentimentLabel;
use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messaging surface a record came from or is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Whatsapp,
    Instagram,
    Messenger,
    Email,
    Website,
    Unknown,
}

string_enum!(Channel {
    Whatsapp => "whatsapp",
    Instagram => "instagram",
    Messenger => "messenger",
    Email => "email",
    Website => "website",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    WaitingCustomer,
    WaitingAgent,
    Resolved,
    Closed,
}

string_enum!(ConversationStatus {
    Active => "active",
    WaitingCustomer => "waiting_customer",
    WaitingAgent => "waiting_agent",
    Resolved => "resolved",
    Closed => "closed",
});

/// A channel-scoped thread with one lead or customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub lead_id: Option<String>,
    pub customer_id: Option<String>,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub message_count: u32,
    pub avg_sentiment_score: Option<f64>,
    pub bot_handled: bool,
    pub escalated: bool,
    pub escalation_reason: Option<EscalationReason>,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            lead_id: None,
            customer_id: None,
            channel,
            status: ConversationStatus::Active,
            message_count: 0,
            avg_sentiment_score: None,
            bot_handled: true,
            escalated: false,
            escalation_reason: None,
            started_at: now,
            last_message_at: now,
            closed_at: None,
        }
    }

    /// Fold a new sentiment reading into the running mean.
    ///
    /// `message_count` must already include the message the score belongs to.
    pub fn record_sentiment(&mut self, score: f64) {
        let n = self.message_count.max(1) as f64;
        self.avg_sentiment_score = Some(match self.avg_sentiment_score {
            Some(avg) => avg + (score - avg) / n,
            None => score,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Bot,
    Agent,
}

string_enum!(SenderType {
    Customer => "customer",
    Bot => "bot",
    Agent => "agent",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

string_enum!(Direction {
    Inbound => "inbound",
    Outbound => "outbound",
});

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub sender: SenderType,
    pub direction: Direction,
    pub intent: Option<IntentType>,
    pub sentiment: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn inbound(conversation_id: &str, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            sender: SenderType::Customer,
            direction: Direction::Inbound,
            intent: None,
            sentiment: None,
            sentiment_score: None,
            created_at: now,
        }
    }

    pub fn outbound(
        conversation_id: &str,
        content: &str,
        sender: SenderType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sender,
            direction: Direction::Outbound,
            ..Self::inbound(conversation_id, content, now)
        }
    }
}

/// An unprocessed webhook delivery as received from a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub channel: Channel,
    pub sender_id: String,
    pub content: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RawMessage {
    pub fn new(
        channel: Channel,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: crate::new_id(),
            channel,
            sender_id: sender_id.into(),
            content: content.into(),
            payload,
            processed: false,
            processing_error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_tracks_all_messages() {
        let mut conv = Conversation::new(Channel::Whatsapp, Utc::now());
        for score in [-1.0, -0.5, 0.0, 0.5] {
            conv.message_count += 1;
            conv.record_sentiment(score);
        }
        let avg = conv.avg_sentiment_score.unwrap();
        assert!((avg - (-0.25)).abs() < 1e-9);
    }

    #[test]
    fn outbound_message_keeps_conversation() {
        let msg = ConversationMessage::outbound("c1", "hi", SenderType::Bot, Utc::now());
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.direction, Direction::Outbound);
        assert_eq!(msg.sender, SenderType::Bot);
    }
}
