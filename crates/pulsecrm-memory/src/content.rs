//! Generated marketing content and scheduled outbound messages.

use crate::codec::{get_enum, get_json, get_opt_ts, get_ts, opt_ts, to_json, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::{DateTime, Utc};
use pulsecrm_types::content::{DeliveryStatus, GeneratedContent, ScheduledMessage};
use rusqlite::{params, Row};

const CONTENT_COLUMNS: &str = "id, content_type, platform, topic, asset_url, copy, hashtags, status, scheduled_for, published_at, external_id, metrics, created_at";

fn content_from_row(r: &Row<'_>) -> rusqlite::Result<GeneratedContent> {
    Ok(GeneratedContent {
        id: r.get(0)?,
        content_type: r.get(1)?,
        platform: get_enum(r, 2)?,
        topic: r.get(3)?,
        asset_url: r.get(4)?,
        copy: r.get(5)?,
        hashtags: get_json(r, 6)?,
        status: get_enum(r, 7)?,
        scheduled_for: get_opt_ts(r, 8)?,
        published_at: get_opt_ts(r, 9)?,
        external_id: r.get(10)?,
        metrics: get_json(r, 11)?,
        created_at: get_ts(r, 12)?,
    })
}

const SCHEDULED_COLUMNS: &str = "id, lead_id, customer_id, channel, recipient, body, campaign, send_at, status, error, created_at, sent_at";

fn scheduled_from_row(r: &Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    Ok(ScheduledMessage {
        id: r.get(0)?,
        lead_id: r.get(1)?,
        customer_id: r.get(2)?,
        channel: get_enum(r, 3)?,
        recipient: r.get(4)?,
        body: r.get(5)?,
        campaign: r.get(6)?,
        send_at: get_ts(r, 7)?,
        status: get_enum(r, 8)?,
        error: r.get(9)?,
        created_at: get_ts(r, 10)?,
        sent_at: get_opt_ts(r, 11)?,
    })
}

impl CrmStore {
    pub fn insert_content(&self, c: &GeneratedContent) -> Result<()> {
        let hashtags = to_json(&c.hashtags)?;
        let metrics = to_json(&c.metrics)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO generated_content ({CONTENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id,
                c.content_type,
                c.platform.as_str(),
                c.topic,
                c.asset_url,
                c.copy,
                hashtags,
                c.status.as_str(),
                opt_ts(&c.scheduled_for),
                opt_ts(&c.published_at),
                c.external_id,
                metrics,
                ts(&c.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_content(&self, c: &GeneratedContent) -> Result<()> {
        let hashtags = to_json(&c.hashtags)?;
        let metrics = to_json(&c.metrics)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE generated_content SET asset_url = ?, copy = ?, hashtags = ?, status = ?, scheduled_for = ?,
                published_at = ?, external_id = ?, metrics = ?
             WHERE id = ?",
            params![
                c.asset_url,
                c.copy,
                hashtags,
                c.status.as_str(),
                opt_ts(&c.scheduled_for),
                opt_ts(&c.published_at),
                c.external_id,
                metrics,
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "content",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_content(&self, id: &str) -> Result<Option<GeneratedContent>> {
        let conn = self.conn()?;
        let content = conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM generated_content WHERE id = ?"),
                params![id],
                content_from_row,
            )
            .optional()?;
        Ok(content)
    }

    /// Content in `scheduled` state whose publish time has arrived.
    pub fn due_scheduled_content(&self, now: DateTime<Utc>) -> Result<Vec<GeneratedContent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTENT_COLUMNS} FROM generated_content
             WHERE status = 'scheduled' AND scheduled_for IS NOT NULL AND scheduled_for <= ?
             ORDER BY scheduled_for ASC"
        ))?;
        let rows = stmt
            .query_map(params![ts(&now)], content_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn insert_scheduled_message(&self, m: &ScheduledMessage) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO scheduled_messages ({SCHEDULED_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                m.id,
                m.lead_id,
                m.customer_id,
                m.channel.as_str(),
                m.recipient,
                m.body,
                m.campaign,
                ts(&m.send_at),
                m.status.as_str(),
                m.error,
                ts(&m.created_at),
                opt_ts(&m.sent_at),
            ],
        )?;
        Ok(())
    }

    pub fn due_scheduled_messages(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages
             WHERE status = 'pending' AND send_at <= ? ORDER BY send_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![ts(&now)], scheduled_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn scheduled_messages_for_lead(&self, lead_id: &str) -> Result<Vec<ScheduledMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages WHERE lead_id = ? ORDER BY send_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![lead_id], scheduled_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether a message for `campaign` was already queued for the lead.
    pub fn campaign_step_queued(&self, lead_id: &str, campaign: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scheduled_messages WHERE lead_id = ? AND campaign = ? AND status != 'cancelled'",
            params![lead_id, campaign],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn mark_scheduled_message(
        &self,
        id: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let sent_at = (status == DeliveryStatus::Sent).then(|| ts(&Utc::now()));
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scheduled_messages SET status = ?, error = ?, sent_at = COALESCE(?, sent_at) WHERE id = ?",
            params![status.as_str(), error, sent_at, id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pulsecrm_types::content::{ContentStatus, Platform};
    use pulsecrm_types::conversation::Channel;

    fn scheduled(lead: &str, send_at: DateTime<Utc>, campaign: &str) -> ScheduledMessage {
        ScheduledMessage {
            id: pulsecrm_types::new_id(),
            lead_id: Some(lead.into()),
            customer_id: None,
            channel: Channel::Whatsapp,
            recipient: "50760000000".into(),
            body: "hello".into(),
            campaign: Some(campaign.into()),
            send_at,
            status: DeliveryStatus::Pending,
            error: None,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    #[test]
    fn due_messages_and_marking() {
        let store = CrmStore::open_in_memory().unwrap();
        let now = Utc::now();
        let due = scheduled("l1", now - Duration::minutes(5), "cold_to_warm:0");
        let later = scheduled("l1", now + Duration::hours(2), "cold_to_warm:2");
        store.insert_scheduled_message(&due).unwrap();
        store.insert_scheduled_message(&later).unwrap();

        let ready = store.due_scheduled_messages(now).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, due.id);
        assert!(store.campaign_step_queued("l1", "cold_to_warm:2").unwrap());
        assert!(!store.campaign_step_queued("l1", "cold_to_warm:4").unwrap());

        store
            .mark_scheduled_message(&due.id, DeliveryStatus::Sent, None)
            .unwrap();
        assert!(store.due_scheduled_messages(now).unwrap().is_empty());
        let rows = store.scheduled_messages_for_lead("l1").unwrap();
        assert!(rows[0].sent_at.is_some());
    }

    #[test]
    fn scheduled_content_becomes_due() {
        let store = CrmStore::open_in_memory().unwrap();
        let now = Utc::now();
        let content = GeneratedContent {
            id: pulsecrm_types::new_id(),
            content_type: "post".into(),
            platform: Platform::Instagram,
            topic: "summer sale".into(),
            asset_url: Some("https://cdn.example.com/a.jpg".into()),
            copy: "Sun's out".into(),
            hashtags: vec!["#summer".into()],
            status: ContentStatus::Scheduled,
            scheduled_for: Some(now - Duration::minutes(1)),
            published_at: None,
            external_id: None,
            metrics: serde_json::json!({}),
            created_at: now,
        };
        store.insert_content(&content).unwrap();
        let due = store.due_scheduled_content(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].hashtags, vec!["#summer"]);
    }
}
