//! Payment reminders.

use crate::error::KernelResult;
use crate::kernel::customer_route;
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Utc};
use pulsecrm_types::alert::{AlertSeverity, AlertType};
use pulsecrm_types::commerce::{Invoice, InvoiceStatus};
use serde_json::json;
use tracing::{info, warn};

/// Reminder stage reached by an invoice `days_from_due` days after its due
/// date (negative before). 0 means nothing is due yet.
///
/// | stage | when | tone |
/// |---|---|---|
/// | 1 | 7 days before | friendly |
/// | 2 | 3 days before | detailed |
/// | 3 | due day | urgent |
/// | 4 | 1 day after | firm, invoice becomes overdue |
/// | 5 | 7 days after | escalated to staff |
pub fn reminder_stage(days_from_due: i64) -> u32 {
    match days_from_due {
        d if d >= 7 => 5,
        d if d >= 1 => 4,
        d if d >= 0 => 3,
        d if d >= -3 => 2,
        d if d >= -7 => 1,
        _ => 0,
    }
}

const ESCALATION_STAGE: u32 = 5;
const OVERDUE_STAGE: u32 = 4;

fn template(stage: u32, invoice: &Invoice) -> String {
    let due = invoice.due_date.format("%Y-%m-%d");
    let number = &invoice.number;
    let amount = invoice.amount;
    match stage {
        1 => format!(
            "Hola, te recordamos que la factura #{number} por ${amount:.2} vence el {due}. ¡Gracias por tu preferencia!"
        ),
        2 => format!(
            "Tu factura #{number} por ${amount:.2} vence en 3 días ({due}). Puedes pagar por transferencia o tarjeta respondiendo a este mensaje."
        ),
        3 => format!(
            "Hoy vence tu factura #{number} por ${amount:.2}. Te agradecemos realizar el pago hoy para evitar recargos."
        ),
        _ => {
            let mut text = format!(
                "Tu factura #{number} por ${amount:.2} venció el {due}. Por favor regulariza el pago lo antes posible."
            );
            if invoice.late_fee > 0.0 {
                text.push_str(&format!(" Se aplicará un recargo de ${:.2}.", invoice.late_fee));
            }
            text
        }
    }
}

const STAGE_BRIEFS: [&str; 4] = [
    "Friendly reminder seven days before the due date. Helpful, not collections. Thank them for being a customer.",
    "Detailed reminder three days before the due date: invoice summary and payment methods.",
    "Polite urgency: the invoice is due today.",
    "Courteous but firm: the invoice is overdue and may be a genuine oversight; mention any late fee.",
];

impl CrmKernel {
    pub async fn send_payment_reminders(&self) -> KernelResult<JobReport> {
        self.send_payment_reminders_at(Utc::now()).await
    }

    /// Send the latest reminder stage each open invoice has reached, once.
    pub async fn send_payment_reminders_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("payment_reminder");
        for invoice in self.store.open_invoices()? {
            let days = (now.date_naive() - invoice.due_date.date_naive()).num_days();
            let stage = reminder_stage(days);
            if stage == 0 || stage <= invoice.reminder_count {
                continue;
            }
            report.examined += 1;
            match self.apply_reminder_stage(invoice, stage, now).await {
                Ok(true) => report.actions += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(stage, error = %e, "Payment reminder failed");
                    report.errors += 1;
                }
            }
        }
        info!(
            examined = report.examined,
            sent = report.actions,
            "Payment reminder run finished"
        );
        Ok(report)
    }

    async fn apply_reminder_stage(
        &self,
        mut invoice: Invoice,
        stage: u32,
        now: DateTime<Utc>,
    ) -> KernelResult<bool> {
        if stage >= OVERDUE_STAGE && invoice.status == InvoiceStatus::Pending {
            invoice.status = InvoiceStatus::Overdue;
            self.store.update_invoice(&invoice)?;
        }

        if stage == ESCALATION_STAGE {
            let days = (now - invoice.due_date).num_days();
            self.escalate_alert(
                AlertType::PaymentOverdue,
                AlertSeverity::Critical,
                format!("Invoice {} unpaid {days} days after due date, escalate to collections", invoice.number),
                invoice.id.clone(),
                json!({
                    "invoice_id": invoice.id,
                    "customer_id": invoice.customer_id,
                    "amount": invoice.amount,
                    "days_overdue": days,
                }),
            )?;
        } else {
            let customer = self.customer(&invoice.customer_id)?;
            let Some((channel, recipient)) = customer_route(&customer) else {
                warn!(invoice_id = %invoice.id, "Customer has no contact, reminder not sent");
                return Ok(false);
            };
            let text = self.reminder_text(stage, &invoice).await;
            self.send_text(channel, &recipient, &text).await?;
        }

        invoice.reminder_count = stage;
        invoice.last_reminder_at = Some(now);
        self.store.update_invoice(&invoice)?;
        info!(invoice_id = %invoice.id, stage, "Payment reminder stage applied");
        Ok(true)
    }

    async fn reminder_text(&self, stage: u32, invoice: &Invoice) -> String {
        let Some(ai) = &self.ai else {
            return template(stage, invoice);
        };
        let brief = STAGE_BRIEFS[(stage.clamp(1, 4) - 1) as usize];
        let prompt = format!(
            "Invoice #{}\nAmount: ${:.2}\nDue: {}\nLate fee: ${:.2}\nGoal: {brief}",
            invoice.number,
            invoice.amount,
            invoice.due_date.format("%Y-%m-%d"),
            invoice.late_fee,
        );
        match ai
            .complete_text(
                "You write short payment reminder messages in Spanish. Reply with the message text only.",
                &prompt,
                0.5,
                300,
            )
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => template(stage, invoice),
            Err(e) => {
                warn!(invoice_id = %invoice.id, error = %e, "Reminder generation failed, using template");
                template(stage, invoice)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use chrono::Duration;
    use pulsecrm_types::alert::AlertStatus;
    use pulsecrm_types::customer::Customer;

    #[test]
    fn stage_table() {
        assert_eq!(reminder_stage(-10), 0);
        assert_eq!(reminder_stage(-7), 1);
        assert_eq!(reminder_stage(-4), 1);
        assert_eq!(reminder_stage(-3), 2);
        assert_eq!(reminder_stage(0), 3);
        assert_eq!(reminder_stage(1), 4);
        assert_eq!(reminder_stage(6), 4);
        assert_eq!(reminder_stage(7), 5);
    }

    fn seed(kernel: &CrmKernel, due_in_days: i64) -> Invoice {
        let mut customer = Customer::new(Utc::now());
        customer.email = Some("pagos@example.com".into());
        kernel.store.insert_customer(&customer).unwrap();
        let invoice = Invoice::new(
            &customer.id,
            "F-001",
            250.0,
            Utc::now() + Duration::days(due_in_days),
        );
        kernel.store.insert_invoice(&invoice).unwrap();
        invoice
    }

    #[tokio::test]
    async fn each_stage_is_sent_once() {
        let (kernel, sink) = test_kernel(None);
        let invoice = seed(&kernel, 5);

        let now = Utc::now();
        assert_eq!(kernel.send_payment_reminders_at(now).await.unwrap().actions, 1);
        assert_eq!(kernel.send_payment_reminders_at(now).await.unwrap().actions, 0);
        assert_eq!(sink.sent_to("pagos@example.com").len(), 1);

        let stored = kernel.store.get_invoice(&invoice.id).unwrap().unwrap();
        assert_eq!(stored.reminder_count, 1);
        assert!(stored.last_reminder_at.is_some());
    }

    #[tokio::test]
    async fn only_latest_stage_is_sent_and_marks_overdue() {
        let (kernel, sink) = test_kernel(None);
        let invoice = seed(&kernel, -2);

        kernel.send_payment_reminders().await.unwrap();
        let stored = kernel.store.get_invoice(&invoice.id).unwrap().unwrap();
        assert_eq!(stored.reminder_count, 4);
        assert_eq!(stored.status, InvoiceStatus::Overdue);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("venció"));
    }

    #[tokio::test]
    async fn long_overdue_escalates_without_messaging() {
        let (kernel, sink) = test_kernel(None);
        let invoice = seed(&kernel, -9);

        kernel.send_payment_reminders().await.unwrap();
        assert!(sink.sent().is_empty());

        let alerts = kernel.list_alerts(Some(AlertStatus::Active), 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].data["invoice_id"], invoice.id.as_str());

        // Already at the last stage.
        assert_eq!(kernel.send_payment_reminders().await.unwrap().examined, 0);
    }

    #[tokio::test]
    async fn overdue_invoice_keeps_a_single_alert() {
        let (kernel, _) = test_kernel(None);
        let invoice = seed(&kernel, -9);

        kernel.check_all_alerts().await.unwrap();
        let alerts = kernel.list_alerts(None, 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::High);

        kernel.send_payment_reminders().await.unwrap();
        kernel.check_all_alerts().await.unwrap();
        let alerts = kernel.list_alerts(None, 10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].subject_key.as_deref(), Some(invoice.id.as_str()));
    }

    #[tokio::test]
    async fn paid_invoices_are_ignored() {
        let (kernel, sink) = test_kernel(None);
        let mut invoice = seed(&kernel, 0);
        invoice.status = InvoiceStatus::Paid;
        kernel.store.update_invoice(&invoice).unwrap();
        kernel.send_payment_reminders().await.unwrap();
        assert!(sink.sent().is_empty());
    }
}
