//! Conversations, their messages, and raw webhook deliveries.

use crate::codec::{get_enum, get_json, get_opt_enum, get_opt_ts, get_ts, opt_ts, to_json, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::{DateTime, Utc};
use pulsecrm_types::conversation::{Channel, Conversation, ConversationMessage, RawMessage};
use rusqlite::{params, Row};

const CONVERSATION_COLUMNS: &str = "id, lead_id, customer_id, channel, status, message_count, avg_sentiment_score, bot_handled, escalated, escalation_reason, started_at, last_message_at, closed_at";

fn conversation_from_row(r: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: r.get(0)?,
        lead_id: r.get(1)?,
        customer_id: r.get(2)?,
        channel: get_enum(r, 3)?,
        status: get_enum(r, 4)?,
        message_count: r.get(5)?,
        avg_sentiment_score: r.get(6)?,
        bot_handled: r.get(7)?,
        escalated: r.get(8)?,
        escalation_reason: get_opt_enum(r, 9)?,
        started_at: get_ts(r, 10)?,
        last_message_at: get_ts(r, 11)?,
        closed_at: get_opt_ts(r, 12)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, content, sender, direction, intent, sentiment, sentiment_score, created_at";

fn message_from_row(r: &Row<'_>) -> rusqlite::Result<ConversationMessage> {
    Ok(ConversationMessage {
        id: r.get(0)?,
        conversation_id: r.get(1)?,
        content: r.get(2)?,
        sender: get_enum(r, 3)?,
        direction: get_enum(r, 4)?,
        intent: get_opt_enum(r, 5)?,
        sentiment: get_opt_enum(r, 6)?,
        sentiment_score: r.get(7)?,
        created_at: get_ts(r, 8)?,
    })
}

const RAW_COLUMNS: &str =
    "id, channel, sender_id, content, payload, processed, processing_error, received_at, processed_at";

fn raw_from_row(r: &Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: r.get(0)?,
        channel: get_enum(r, 1)?,
        sender_id: r.get(2)?,
        content: r.get(3)?,
        payload: get_json(r, 4)?,
        processed: r.get(5)?,
        processing_error: r.get(6)?,
        received_at: get_ts(r, 7)?,
        processed_at: get_opt_ts(r, 8)?,
    })
}

impl CrmStore {
    pub fn insert_conversation(&self, c: &Conversation) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id,
                c.lead_id,
                c.customer_id,
                c.channel.as_str(),
                c.status.as_str(),
                c.message_count,
                c.avg_sentiment_score,
                c.bot_handled,
                c.escalated,
                c.escalation_reason.map(|r| r.as_str()),
                ts(&c.started_at),
                ts(&c.last_message_at),
                opt_ts(&c.closed_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_conversation(&self, c: &Conversation) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE conversations SET lead_id = ?, customer_id = ?, status = ?, message_count = ?, avg_sentiment_score = ?,
                bot_handled = ?, escalated = ?, escalation_reason = ?, last_message_at = ?, closed_at = ?
             WHERE id = ?",
            params![
                c.lead_id,
                c.customer_id,
                c.status.as_str(),
                c.message_count,
                c.avg_sentiment_score,
                c.bot_handled,
                c.escalated,
                c.escalation_reason.map(|r| r.as_str()),
                ts(&c.last_message_at),
                opt_ts(&c.closed_at),
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "conversation",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        let conv = conn
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"),
                params![id],
                conversation_from_row,
            )
            .optional()?;
        Ok(conv)
    }

    /// The open (not resolved/closed) conversation a lead has on `channel`.
    pub fn find_open_conversation(
        &self,
        lead_id: &str,
        channel: Channel,
    ) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        let conv = conn
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE lead_id = ? AND channel = ? AND status NOT IN ('resolved', 'closed')
                     ORDER BY last_message_at DESC LIMIT 1"
                ),
                params![lead_id, channel.as_str()],
                conversation_from_row,
            )
            .optional()?;
        Ok(conv)
    }

    pub fn conversations_for_lead(&self, lead_id: &str) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE lead_id = ? ORDER BY last_message_at DESC"
        ))?;
        let convs = stmt
            .query_map(params![lead_id], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(convs)
    }

    /// Conversations whose running sentiment is below `threshold` and that
    /// saw a message at or after `since`.
    pub fn negative_conversations_since(
        &self,
        threshold: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE avg_sentiment_score IS NOT NULL AND avg_sentiment_score < ? AND last_message_at >= ?
             ORDER BY avg_sentiment_score ASC"
        ))?;
        let convs = stmt
            .query_map(params![threshold, ts(&since)], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(convs)
    }

    pub fn insert_message(&self, m: &ConversationMessage) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                m.id,
                m.conversation_id,
                m.content,
                m.sender.as_str(),
                m.direction.as_str(),
                m.intent.map(|i| i.as_str()),
                m.sentiment.map(|s| s.as_str()),
                m.sentiment_score,
                ts(&m.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_message_analysis(&self, m: &ConversationMessage) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE messages SET intent = ?, sentiment = ?, sentiment_score = ? WHERE id = ?",
            params![
                m.intent.map(|i| i.as_str()),
                m.sentiment.map(|s| s.as_str()),
                m.sentiment_score,
                m.id,
            ],
        )?;
        Ok(())
    }

    /// The last `limit` messages of a conversation, oldest first.
    pub fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))?;
        let mut messages = stmt
            .query_map(params![conversation_id, limit as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    pub fn insert_raw_message(&self, m: &RawMessage) -> Result<()> {
        let payload = to_json(&m.payload)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO raw_messages ({RAW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                m.id,
                m.channel.as_str(),
                m.sender_id,
                m.content,
                payload,
                m.processed,
                m.processing_error,
                ts(&m.received_at),
                opt_ts(&m.processed_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RAW_COLUMNS} FROM raw_messages WHERE id = ?"),
                params![id],
                raw_from_row,
            )
            .optional()?;
        Ok(raw)
    }

    /// Record the outcome of processing a raw message.
    pub fn mark_raw_processed(&self, id: &str, error: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE raw_messages SET processed = 1, processing_error = ?, processed_at = ? WHERE id = ?",
            params![error, ts(&Utc::now()), id],
        )?;
        Ok(())
    }

    pub fn unprocessed_raw_messages(&self, limit: usize) -> Result<Vec<RawMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RAW_COLUMNS} FROM raw_messages WHERE processed = 0 ORDER BY received_at ASC LIMIT ?"
        ))?;
        let raws = stmt
            .query_map(params![limit as i64], raw_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(raws)
    }
}
