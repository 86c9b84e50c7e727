//! Persisted intent and sentiment readings.

use crate::codec::{get_enum, get_json, get_ts, to_json, ts};
use crate::{CrmStore, Result};
use pulsecrm_types::intent::LeadIntent;
use pulsecrm_types::sentiment::SentimentAnalysis;
use rusqlite::{params, Row};

fn intent_from_row(r: &Row<'_>) -> rusqlite::Result<LeadIntent> {
    Ok(LeadIntent {
        id: r.get(0)?,
        lead_id: r.get(1)?,
        message_id: r.get(2)?,
        primary_intent: get_enum(r, 3)?,
        secondary_intents: get_json(r, 4)?,
        confidence: r.get(5)?,
        entities: get_json(r, 6)?,
        created_at: get_ts(r, 7)?,
    })
}

fn sentiment_from_row(r: &Row<'_>) -> rusqlite::Result<SentimentAnalysis> {
    Ok(SentimentAnalysis {
        id: r.get(0)?,
        lead_id: r.get(1)?,
        customer_id: r.get(2)?,
        message_id: r.get(3)?,
        sentiment: get_enum(r, 4)?,
        score: r.get(5)?,
        confidence: r.get(6)?,
        emotions: get_json(r, 7)?,
        urgency: get_enum(r, 8)?,
        churn_risk: r.get(9)?,
        ai_model: r.get(10)?,
        created_at: get_ts(r, 11)?,
    })
}

impl CrmStore {
    pub fn insert_intent(&self, i: &LeadIntent) -> Result<()> {
        let secondary = to_json(&i.secondary_intents)?;
        let entities = to_json(&i.entities)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO lead_intents (id, lead_id, message_id, primary_intent, secondary_intents, confidence, entities, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                i.id,
                i.lead_id,
                i.message_id,
                i.primary_intent.as_str(),
                secondary,
                i.confidence,
                entities,
                ts(&i.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn intents_for_lead(&self, lead_id: &str) -> Result<Vec<LeadIntent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, lead_id, message_id, primary_intent, secondary_intents, confidence, entities, created_at
             FROM lead_intents WHERE lead_id = ? ORDER BY created_at DESC",
        )?;
        let intents = stmt
            .query_map(params![lead_id], intent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(intents)
    }

    pub fn insert_sentiment(&self, s: &SentimentAnalysis) -> Result<()> {
        let emotions = to_json(&s.emotions)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sentiment_analyses (id, lead_id, customer_id, message_id, sentiment, score, confidence, emotions, urgency, churn_risk, ai_model, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                s.id,
                s.lead_id,
                s.customer_id,
                s.message_id,
                s.sentiment.as_str(),
                s.score,
                s.confidence,
                emotions,
                s.urgency.as_str(),
                s.churn_risk,
                s.ai_model,
                ts(&s.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn sentiments_for_lead(&self, lead_id: &str, limit: usize) -> Result<Vec<SentimentAnalysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, lead_id, customer_id, message_id, sentiment, score, confidence, emotions, urgency, churn_risk, ai_model, created_at
             FROM sentiment_analyses WHERE lead_id = ? ORDER BY created_at DESC LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![lead_id, limit as i64], sentiment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulsecrm_types::intent::IntentType;
    use pulsecrm_types::sentiment::{SentimentLabel, UrgencyLevel};

    #[test]
    fn intent_entities_survive_storage() {
        let store = CrmStore::open_in_memory().unwrap();
        let mut entities = serde_json::Map::new();
        entities.insert("product".into(), serde_json::json!("sofa"));
        store
            .insert_intent(&LeadIntent {
                id: pulsecrm_types::new_id(),
                lead_id: "l1".into(),
                message_id: None,
                primary_intent: IntentType::PricingQuestion,
                secondary_intents: vec![IntentType::DeliveryTracking],
                confidence: 0.82,
                entities,
                created_at: Utc::now(),
            })
            .unwrap();
        let got = store.intents_for_lead("l1").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].primary_intent, IntentType::PricingQuestion);
        assert_eq!(got[0].secondary_intents, vec![IntentType::DeliveryTracking]);
        assert_eq!(got[0].entities["product"], "sofa");
    }

    #[test]
    fn sentiment_rows_by_lead() {
        let store = CrmStore::open_in_memory().unwrap();
        store
            .insert_sentiment(&SentimentAnalysis {
                id: pulsecrm_types::new_id(),
                lead_id: Some("l1".into()),
                customer_id: None,
                message_id: None,
                sentiment: SentimentLabel::Negative,
                score: -0.8,
                confidence: 0.9,
                emotions: vec!["anger".into()],
                urgency: UrgencyLevel::High,
                churn_risk: 75.0,
                ai_model: "test".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        let rows = store.sentiments_for_lead("l1", 10).unwrap();
        assert_eq!(rows[0].emotions, vec!["anger"]);
        assert_eq!(rows[0].urgency, UrgencyLevel::High);
    }
}
