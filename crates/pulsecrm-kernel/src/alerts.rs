//! Operational alerts.

use crate::error::{KernelError, KernelResult};
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Duration, Utc};
use pulsecrm_memory::MemoryError;
use pulsecrm_types::alert::{Alert, AlertSeverity, AlertStatus, AlertType};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Sales in the last week below this share of the week before raise an alert.
const SALES_DROP_RATIO: f64 = 0.7;
const CHURN_SENTIMENT_THRESHOLD: f64 = -0.7;
const HOT_LEAD_MIN_SCORE: u8 = 90;

impl CrmKernel {
    /// Store a new alert unless an unresolved one with the same type and
    /// subject already exists. Returns the stored alert, if any.
    pub fn raise_alert(
        &self,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        subject_key: Option<String>,
        data: Value,
    ) -> KernelResult<Option<Alert>> {
        if let Some(key) = &subject_key {
            if self.store.unresolved_alert_exists(alert_type, key)? {
                return Ok(None);
            }
        }
        let alert = Alert::new(alert_type, severity, message, subject_key, data);
        self.store.insert_alert(&alert)?;
        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "Alert raised"
        );
        Ok(Some(alert))
    }

    /// Like [`raise_alert`](Self::raise_alert), but an unresolved alert for
    /// the same subject is raised to `severity` instead of being skipped.
    pub fn escalate_alert(
        &self,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        subject_key: String,
        data: Value,
    ) -> KernelResult<Alert> {
        let message = message.into();
        let escalated = self
            .store
            .escalate_unresolved_alert(alert_type, &subject_key, severity, &message, &data)?;
        if let Some(alert) = escalated {
            info!(alert_id = %alert.id, severity = %alert.severity, "Alert escalated");
            return Ok(alert);
        }
        let alert = Alert::new(alert_type, severity, message, Some(subject_key), data);
        self.store.insert_alert(&alert)?;
        info!(alert_id = %alert.id, alert_type = %alert.alert_type, severity = %alert.severity, "Alert raised");
        Ok(alert)
    }

    pub async fn check_all_alerts(&self) -> KernelResult<JobReport> {
        self.check_all_alerts_at(Utc::now()).await
    }

    /// Run every monitor as of `now`. One failing monitor does not stop the
    /// others; its error is counted in the report.
    pub async fn check_all_alerts_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("alerts");
        let monitors: [(&str, KernelResult<(usize, usize)>); 4] = [
            ("sales_drop", self.check_sales_drop(now)),
            ("churn_risk", self.check_churn_risk(now)),
            ("hot_leads", self.check_hot_leads(now)),
            ("overdue_invoices", self.check_overdue_invoices(now)),
        ];
        for (monitor, outcome) in monitors {
            match outcome {
                Ok((examined, raised)) => {
                    report.examined += examined;
                    report.actions += raised;
                }
                Err(e) => {
                    warn!(monitor, error = %e, "Alert monitor failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    fn check_sales_drop(&self, now: DateTime<Utc>) -> KernelResult<(usize, usize)> {
        let week_ago = now - Duration::days(7);
        let current = self.store.purchase_total_between(week_ago, now)?;
        let previous = self
            .store
            .purchase_total_between(week_ago - Duration::days(7), week_ago)?;
        if previous <= 0.0 || current >= previous * SALES_DROP_RATIO {
            return Ok((1, 0));
        }
        let drop_pct = (1.0 - current / previous) * 100.0;
        let raised = self.raise_alert(
            AlertType::SalesDrop,
            AlertSeverity::High,
            format!("Sales dropped {drop_pct:.1}% week over week"),
            Some(format!("sales_drop:{}", now.date_naive())),
            json!({ "current_week": current, "previous_week": previous, "drop_pct": drop_pct }),
        )?;
        Ok((1, usize::from(raised.is_some())))
    }

    fn check_churn_risk(&self, now: DateTime<Utc>) -> KernelResult<(usize, usize)> {
        let conversations = self
            .store
            .negative_conversations_since(CHURN_SENTIMENT_THRESHOLD, now - Duration::days(7))?;
        let mut raised = 0;
        for conv in &conversations {
            let Some(subject) = conv.customer_id.clone().or_else(|| conv.lead_id.clone()) else {
                continue;
            };
            let avg = conv.avg_sentiment_score.unwrap_or_default();
            let alert = self.raise_alert(
                AlertType::ChurnRisk,
                AlertSeverity::Critical,
                format!("Customer at risk of churning (avg sentiment {avg:.2})"),
                Some(subject),
                json!({
                    "conversation_id": conv.id,
                    "customer_id": conv.customer_id,
                    "lead_id": conv.lead_id,
                    "avg_sentiment": avg,
                }),
            )?;
            raised += usize::from(alert.is_some());
        }
        Ok((conversations.len(), raised))
    }

    fn check_hot_leads(&self, now: DateTime<Utc>) -> KernelResult<(usize, usize)> {
        let leads = self
            .store
            .hot_leads_since(HOT_LEAD_MIN_SCORE, now - Duration::hours(1))?;
        if leads.is_empty() {
            return Ok((0, 0));
        }
        let ids: Vec<&str> = leads.iter().map(|l| l.id.as_str()).collect();
        let raised = self.raise_alert(
            AlertType::HotLead,
            AlertSeverity::High,
            format!("{} new hot lead(s) need attention", leads.len()),
            Some(format!("hot_leads:{}", now.format("%Y-%m-%dT%H"))),
            json!({ "lead_ids": ids }),
        )?;
        Ok((leads.len(), usize::from(raised.is_some())))
    }

    fn check_overdue_invoices(&self, now: DateTime<Utc>) -> KernelResult<(usize, usize)> {
        let invoices = self.store.open_invoices()?;
        let mut examined = 0;
        let mut raised = 0;
        for invoice in invoices.iter().filter(|i| i.due_date < now) {
            examined += 1;
            let days = (now - invoice.due_date).num_days();
            let alert = self.raise_alert(
                AlertType::PaymentOverdue,
                AlertSeverity::High,
                format!("Invoice {} is {days} day(s) overdue", invoice.number),
                Some(invoice.id.clone()),
                json!({
                    "invoice_id": invoice.id,
                    "customer_id": invoice.customer_id,
                    "amount": invoice.amount,
                    "days_overdue": days,
                }),
            )?;
            raised += usize::from(alert.is_some());
        }
        Ok((examined, raised))
    }

    pub fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> KernelResult<Vec<Alert>> {
        Ok(self.store.list_alerts(status, limit)?)
    }

    pub fn acknowledge_alert(&self, id: &str, by: &str) -> KernelResult<Alert> {
        if by.trim().is_empty() {
            return Err(KernelError::Invalid("acknowledged_by is required".into()));
        }
        self.store.acknowledge_alert(id, by).map_err(alert_error)
    }

    pub fn resolve_alert(&self, id: &str) -> KernelResult<Alert> {
        self.store.resolve_alert(id).map_err(alert_error)
    }
}

fn alert_error(e: MemoryError) -> KernelError {
    match e {
        MemoryError::NotFound { id, .. } => KernelError::not_found("alert", id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use pulsecrm_types::commerce::{Invoice, Purchase};
    use pulsecrm_types::conversation::{Channel, Conversation};
    use pulsecrm_types::lead::Lead;
    use pulsecrm_types::new_id;

    fn purchase(amount: f64, at: DateTime<Utc>) -> Purchase {
        Purchase {
            id: new_id(),
            customer_id: "c1".into(),
            amount,
            description: None,
            purchased_at: at,
        }
    }

    #[test]
    fn duplicate_subject_is_suppressed_until_resolved() {
        let (kernel, _) = test_kernel(None);
        let first = kernel
            .raise_alert(AlertType::HotLead, AlertSeverity::High, "a", Some("k".into()), Value::Null)
            .unwrap()
            .unwrap();
        let second = kernel
            .raise_alert(AlertType::HotLead, AlertSeverity::High, "b", Some("k".into()), Value::Null)
            .unwrap();
        assert!(second.is_none());

        kernel.resolve_alert(&first.id).unwrap();
        let third = kernel
            .raise_alert(AlertType::HotLead, AlertSeverity::High, "c", Some("k".into()), Value::Null)
            .unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn sales_drop_detected_once() {
        let (kernel, _) = test_kernel(None);
        let now = Utc::now();
        kernel.store.insert_purchase(&purchase(1000.0, now - Duration::days(10))).unwrap();
        kernel.store.insert_purchase(&purchase(200.0, now - Duration::days(2))).unwrap();

        let report = kernel.check_all_alerts_at(now).await.unwrap();
        assert_eq!(report.actions, 1);
        let again = kernel.check_all_alerts_at(now).await.unwrap();
        assert_eq!(again.actions, 0);

        let alerts = kernel.list_alerts(Some(AlertStatus::Active), 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::SalesDrop);
    }

    #[tokio::test]
    async fn no_sales_last_fortnight_is_not_a_drop() {
        let (kernel, _) = test_kernel(None);
        let report = kernel.check_all_alerts_at(Utc::now()).await.unwrap();
        assert_eq!(report.actions, 0);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn churn_hot_leads_and_overdue_invoices() {
        let (kernel, _) = test_kernel(None);
        let now = Utc::now();

        let mut conv = Conversation::new(Channel::Whatsapp, now);
        conv.customer_id = Some("cust-1".into());
        conv.avg_sentiment_score = Some(-0.85);
        kernel.store.insert_conversation(&conv).unwrap();

        for score in [95, 92, 60] {
            let mut lead = Lead::new(Channel::Instagram, now - Duration::minutes(10));
            lead.score = score;
            kernel.store.insert_lead(&lead).unwrap();
        }

        let invoice = Invoice::new("cust-1", "INV-7", 300.0, now - Duration::days(3));
        kernel.store.insert_invoice(&invoice).unwrap();

        let report = kernel.check_all_alerts_at(now).await.unwrap();
        assert_eq!(report.actions, 3);

        let alerts = kernel.list_alerts(None, 10).unwrap();
        let by_type = |t: AlertType| alerts.iter().find(|a| a.alert_type == t).unwrap();
        assert_eq!(by_type(AlertType::ChurnRisk).severity, AlertSeverity::Critical);
        assert_eq!(by_type(AlertType::HotLead).data["lead_ids"].as_array().unwrap().len(), 2);
        assert_eq!(by_type(AlertType::PaymentOverdue).subject_key.as_deref(), Some(invoice.id.as_str()));
    }

    #[test]
    fn acknowledge_and_resolve() {
        let (kernel, _) = test_kernel(None);
        let alert = kernel
            .raise_alert(AlertType::SalesDrop, AlertSeverity::High, "x", None, Value::Null)
            .unwrap()
            .unwrap();

        assert!(matches!(
            kernel.acknowledge_alert(&alert.id, " "),
            Err(KernelError::Invalid(_))
        ));
        let acked = kernel.acknowledge_alert(&alert.id, "maria").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("maria"));
        assert!(acked.acknowledged_at.is_some());

        let resolved = kernel.resolve_alert(&alert.id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);

        let missing = kernel.resolve_alert("nope").unwrap_err();
        assert!(missing.is_not_found());
    }
}
