//! Leads and their classification history.

use crate::codec::{get_enum, get_opt_ts, get_ts, opt_ts, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::{DateTime, Utc};
use pulsecrm_types::lead::{Lead, LeadClassification, LeadStatus};
use rusqlite::{params, Row};

const LEAD_COLUMNS: &str = "id, name, email, phone, company, sender_id, score, category, status, source, campaign_id, follow_up_count, last_activity_at, nurturing_started_at, created_at, updated_at";

fn lead_from_row(r: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        phone: r.get(3)?,
        company: r.get(4)?,
        sender_id: r.get(5)?,
        score: r.get(6)?,
        category: get_enum(r, 7)?,
        status: get_enum(r, 8)?,
        source: get_enum(r, 9)?,
        campaign_id: r.get(10)?,
        follow_up_count: r.get(11)?,
        last_activity_at: get_ts(r, 12)?,
        nurturing_started_at: get_opt_ts(r, 13)?,
        created_at: get_ts(r, 14)?,
        updated_at: get_ts(r, 15)?,
    })
}

impl CrmStore {
    pub fn insert_lead(&self, lead: &Lead) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO leads ({LEAD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                lead.id,
                lead.name,
                lead.email,
                lead.phone,
                lead.company,
                lead.sender_id,
                lead.score,
                lead.category.as_str(),
                lead.status.as_str(),
                lead.source.as_str(),
                lead.campaign_id,
                lead.follow_up_count,
                ts(&lead.last_activity_at),
                opt_ts(&lead.nurturing_started_at),
                ts(&lead.created_at),
                ts(&lead.updated_at),
            ],
        )
        .map_err(|e| {
            if crate::is_constraint_violation(&e) {
                MemoryError::Duplicate(format!("lead {}", lead.id))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    /// Overwrite every mutable column of an existing lead.
    pub fn update_lead(&self, lead: &Lead) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE leads SET name = ?, email = ?, phone = ?, company = ?, sender_id = ?, score = ?, category = ?, status = ?, campaign_id = ?, follow_up_count = ?, last_activity_at = ?, nurturing_started_at = ?, updated_at = ? WHERE id = ?",
            params![
                lead.name,
                lead.email,
                lead.phone,
                lead.company,
                lead.sender_id,
                lead.score,
                lead.category.as_str(),
                lead.status.as_str(),
                lead.campaign_id,
                lead.follow_up_count,
                ts(&lead.last_activity_at),
                opt_ts(&lead.nurturing_started_at),
                ts(&Utc::now()),
                lead.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "lead",
                id: lead.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let conn = self.conn()?;
        let lead = conn
            .query_row(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"),
                params![id],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    pub fn list_leads(&self, limit: usize) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC LIMIT ?"
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(lead_from_row(r)?);
        }
        Ok(out)
    }

    /// Most recent lead registered for a platform sender id.
    pub fn find_lead_by_sender(&self, sender_id: &str) -> Result<Option<Lead>> {
        let conn = self.conn()?;
        let lead = conn
            .query_row(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE sender_id = ? ORDER BY created_at DESC LIMIT 1"
                ),
                params![sender_id],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    /// Lead matching either contact field exactly.
    pub fn find_lead_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Lead>> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let lead = conn
            .query_row(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads
                     WHERE (?1 IS NOT NULL AND email = ?1) OR (?2 IS NOT NULL AND phone = ?2)
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![email, phone],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    /// Leads in one of `statuses` that have received exactly
    /// `follow_up_count` follow-ups and have been silent since before `cutoff`.
    pub fn silent_leads(
        &self,
        statuses: &[LeadStatus],
        follow_up_count: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Lead>> {
        let mut out = Vec::new();
        for lead in self.leads_by_follow_up(follow_up_count, cutoff)? {
            if statuses.contains(&lead.status) {
                out.push(lead);
            }
        }
        Ok(out)
    }

    fn leads_by_follow_up(&self, follow_up_count: u32, cutoff: DateTime<Utc>) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE follow_up_count = ? AND last_activity_at < ?
             ORDER BY last_activity_at ASC"
        ))?;
        let leads = stmt
            .query_map(params![follow_up_count, ts(&cutoff)], lead_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leads)
    }

    pub fn leads_by_status(&self, status: LeadStatus) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE status = ? ORDER BY created_at ASC"
        ))?;
        let leads = stmt
            .query_map(params![status.as_str()], lead_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leads)
    }

    /// Leads scored strictly above `min_score` and created at or after `since`.
    pub fn hot_leads_since(&self, min_score: u8, since: DateTime<Utc>) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE score > ? AND created_at >= ? ORDER BY score DESC"
        ))?;
        let leads = stmt
            .query_map(params![min_score, ts(&since)], lead_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leads)
    }

    pub fn insert_classification(&self, c: &LeadClassification) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO lead_classifications (id, lead_id, score, category, reasoning, recommended_action, ai_model, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                c.id,
                c.lead_id,
                c.score,
                c.category.as_str(),
                c.reasoning,
                c.recommended_action,
                c.ai_model,
                ts(&c.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_classifications(&self, lead_id: &str) -> Result<Vec<LeadClassification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, lead_id, score, category, reasoning, recommended_action, ai_model, created_at
             FROM lead_classifications WHERE lead_id = ? ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![lead_id], |r| {
                Ok(LeadClassification {
                    id: r.get(0)?,
                    lead_id: r.get(1)?,
                    score: r.get(2)?,
                    category: get_enum(r, 3)?,
                    reasoning: r.get(4)?,
                    recommended_action: r.get(5)?,
                    ai_model: r.get(6)?,
                    created_at: get_ts(r, 7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
