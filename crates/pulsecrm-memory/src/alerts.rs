//! Alert storage and lifecycle.

use crate::codec::{get_enum, get_json, get_opt_ts, get_ts, opt_ts, to_json, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::Utc;
use pulsecrm_types::alert::{Alert, AlertSeverity, AlertStatus, AlertType};
use rusqlite::{params, Row};

const ALERT_COLUMNS: &str = "id, alert_type, severity, message, subject_key, data, status, acknowledged_by, acknowledged_at, resolved_at, created_at";

fn alert_from_row(r: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: r.get(0)?,
        alert_type: get_enum(r, 1)?,
        severity: get_enum(r, 2)?,
        message: r.get(3)?,
        subject_key: r.get(4)?,
        data: get_json(r, 5)?,
        status: get_enum(r, 6)?,
        acknowledged_by: r.get(7)?,
        acknowledged_at: get_opt_ts(r, 8)?,
        resolved_at: get_opt_ts(r, 9)?,
        created_at: get_ts(r, 10)?,
    })
}

impl CrmStore {
    pub fn insert_alert(&self, a: &Alert) -> Result<()> {
        let data = to_json(&a.data)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO alerts ({ALERT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                a.id,
                a.alert_type.as_str(),
                a.severity.as_str(),
                a.message,
                a.subject_key,
                data,
                a.status.as_str(),
                a.acknowledged_by,
                opt_ts(&a.acknowledged_at),
                opt_ts(&a.resolved_at),
                ts(&a.created_at),
            ],
        )?;
        Ok(())
    }

    /// Whether an unresolved alert of this type already exists for `subject_key`.
    pub fn unresolved_alert_exists(&self, alert_type: AlertType, subject_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE alert_type = ? AND subject_key = ? AND status != 'resolved'",
            params![alert_type.as_str(), subject_key],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Raise the severity of the newest unresolved alert for `subject_key`,
    /// replacing its message and data and putting it back to active.
    /// Returns `None` when there is no such alert.
    pub fn escalate_unresolved_alert(
        &self,
        alert_type: AlertType,
        subject_key: &str,
        severity: AlertSeverity,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<Option<Alert>> {
        let data = to_json(data)?;
        let id = {
            let conn = self.conn()?;
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM alerts WHERE alert_type = ? AND subject_key = ? AND status != 'resolved'
                     ORDER BY created_at DESC LIMIT 1",
                    params![alert_type.as_str(), subject_key],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(id) = &id {
                conn.execute(
                    "UPDATE alerts SET severity = ?, message = ?, data = ?, status = 'active',
                     acknowledged_by = NULL, acknowledged_at = NULL WHERE id = ?",
                    params![severity.as_str(), message, data, id],
                )?;
            }
            id
        };
        match id {
            Some(id) => self.get_alert(&id),
            None => Ok(None),
        }
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let alert = conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"),
                params![id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let mut rows = stmt.query(params![status.map(|s| s.as_str()), limit as i64])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(alert_from_row(r)?);
        }
        Ok(out)
    }

    pub fn acknowledge_alert(&self, id: &str, by: &str) -> Result<Alert> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE alerts SET status = 'acknowledged', acknowledged_by = ?, acknowledged_at = ? WHERE id = ? AND status = 'active'",
                params![by, ts(&Utc::now()), id],
            )?;
            if changed == 0 && !alert_exists(&conn, id)? {
                return Err(not_found(id));
            }
        }
        self.get_alert(id)?.ok_or_else(|| not_found(id))
    }

    pub fn resolve_alert(&self, id: &str) -> Result<Alert> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE alerts SET status = 'resolved', resolved_at = ? WHERE id = ? AND status != 'resolved'",
                params![ts(&Utc::now()), id],
            )?;
            if changed == 0 && !alert_exists(&conn, id)? {
                return Err(not_found(id));
            }
        }
        self.get_alert(id)?.ok_or_else(|| not_found(id))
    }
}

fn alert_exists(conn: &rusqlite::Connection, id: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM alerts WHERE id = ?",
        params![id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn not_found(id: &str) -> MemoryError {
    MemoryError::NotFound {
        entity: "alert",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_lifecycle() {
        let store = CrmStore::open_in_memory().unwrap();
        let alert = Alert::new(
            AlertType::ChurnRisk,
            AlertSeverity::Critical,
            "Customer at risk",
            Some("cust-1".into()),
            serde_json::json!({"avg_sentiment": -0.8}),
        );
        store.insert_alert(&alert).unwrap();
        assert!(store
            .unresolved_alert_exists(AlertType::ChurnRisk, "cust-1")
            .unwrap());

        let acked = store.acknowledge_alert(&alert.id, "ops@example.com").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops@example.com"));
        assert!(store
            .unresolved_alert_exists(AlertType::ChurnRisk, "cust-1")
            .unwrap());

        let resolved = store.resolve_alert(&alert.id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(!store
            .unresolved_alert_exists(AlertType::ChurnRisk, "cust-1")
            .unwrap());

        let active = store.list_alerts(Some(AlertStatus::Active), 10).unwrap();
        assert!(active.is_empty());
        assert_eq!(store.list_alerts(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn escalation_updates_the_open_alert_in_place() {
        let store = CrmStore::open_in_memory().unwrap();
        assert!(store
            .escalate_unresolved_alert(
                AlertType::PaymentOverdue,
                "inv-1",
                AlertSeverity::Critical,
                "escalate",
                &serde_json::json!({}),
            )
            .unwrap()
            .is_none());

        let alert = Alert::new(
            AlertType::PaymentOverdue,
            AlertSeverity::High,
            "Invoice overdue",
            Some("inv-1".into()),
            serde_json::json!({"days_overdue": 2}),
        );
        store.insert_alert(&alert).unwrap();
        store.acknowledge_alert(&alert.id, "ops").unwrap();

        let escalated = store
            .escalate_unresolved_alert(
                AlertType::PaymentOverdue,
                "inv-1",
                AlertSeverity::Critical,
                "Invoice unpaid, escalate to collections",
                &serde_json::json!({"days_overdue": 7}),
            )
            .unwrap()
            .unwrap();
        assert_eq!(escalated.id, alert.id);
        assert_eq!(escalated.severity, AlertSeverity::Critical);
        assert_eq!(escalated.status, AlertStatus::Active);
        assert_eq!(escalated.acknowledged_by, None);
        assert_eq!(escalated.data["days_overdue"], 7);
        assert_eq!(store.list_alerts(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn unknown_alert_is_not_found() {
        let store = CrmStore::open_in_memory().unwrap();
        assert!(matches!(
            store.resolve_alert("missing"),
            Err(MemoryError::NotFound { .. })
        ));
    }
}
