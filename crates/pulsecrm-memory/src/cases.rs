//! Support cases.

use crate::codec::{get_enum, get_opt_enum, get_opt_ts, get_ts, opt_ts, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use pulsecrm_types::case::Case;
use rusqlite::{params, Row};

const CASE_COLUMNS: &str = "id, conversation_id, lead_id, customer_id, subject, status, priority, escalation_reason, assigned_to, resolution_time_hours, closure_reason, csat, predicted_csat, created_at, closed_at";

fn case_from_row(r: &Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        id: r.get(0)?,
        conversation_id: r.get(1)?,
        lead_id: r.get(2)?,
        customer_id: r.get(3)?,
        subject: r.get(4)?,
        status: get_enum(r, 5)?,
        priority: r.get(6)?,
        escalation_reason: get_opt_enum(r, 7)?,
        assigned_to: r.get(8)?,
        resolution_time_hours: r.get(9)?,
        closure_reason: r.get(10)?,
        csat: r.get(11)?,
        predicted_csat: r.get(12)?,
        created_at: get_ts(r, 13)?,
        closed_at: get_opt_ts(r, 14)?,
    })
}

impl CrmStore {
    pub fn insert_case(&self, c: &Case) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO cases ({CASE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id,
                c.conversation_id,
                c.lead_id,
                c.customer_id,
                c.subject,
                c.status.as_str(),
                c.priority,
                c.escalation_reason.map(|r| r.as_str()),
                c.assigned_to,
                c.resolution_time_hours,
                c.closure_reason,
                c.csat,
                c.predicted_csat,
                ts(&c.created_at),
                opt_ts(&c.closed_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_case(&self, c: &Case) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE cases SET status = ?, priority = ?, assigned_to = ?, resolution_time_hours = ?, closure_reason = ?,
                csat = ?, predicted_csat = ?, closed_at = ?
             WHERE id = ?",
            params![
                c.status.as_str(),
                c.priority,
                c.assigned_to,
                c.resolution_time_hours,
                c.closure_reason,
                c.csat,
                c.predicted_csat,
                opt_ts(&c.closed_at),
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "case",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_case(&self, id: &str) -> Result<Option<Case>> {
        let conn = self.conn()?;
        let case = conn
            .query_row(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?"),
                params![id],
                case_from_row,
            )
            .optional()?;
        Ok(case)
    }

    /// The newest non-terminal case attached to a conversation.
    pub fn open_case_for_conversation(&self, conversation_id: &str) -> Result<Option<Case>> {
        let conn = self.conn()?;
        let case = conn
            .query_row(
                &format!(
                    "SELECT {CASE_COLUMNS} FROM cases
                     WHERE conversation_id = ? AND status NOT IN ('resolved', 'closed')
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![conversation_id],
                case_from_row,
            )
            .optional()?;
        Ok(case)
    }

    pub fn list_cases(&self, limit: usize) -> Result<Vec<Case>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CASE_COLUMNS} FROM cases ORDER BY created_at DESC LIMIT ?"
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(case_from_row(r)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulsecrm_types::case::{CaseStatus, EscalationReason};

    #[test]
    fn open_case_lookup_ignores_closed() {
        let store = CrmStore::open_in_memory().unwrap();
        let mut case = Case::new("Refund dispute", 5, Utc::now());
        case.conversation_id = Some("conv-1".into());
        case.escalation_reason = Some(EscalationReason::LegalIssue);
        store.insert_case(&case).unwrap();

        let open = store.open_case_for_conversation("conv-1").unwrap().unwrap();
        assert_eq!(open.escalation_reason, Some(EscalationReason::LegalIssue));

        case.status = CaseStatus::Closed;
        case.closed_at = Some(Utc::now());
        case.resolution_time_hours = Some(1.5);
        store.update_case(&case).unwrap();
        assert!(store.open_case_for_conversation("conv-1").unwrap().is_none());
        let got = store.get_case(&case.id).unwrap().unwrap();
        assert_eq!(got.resolution_time_hours, Some(1.5));
    }
}
