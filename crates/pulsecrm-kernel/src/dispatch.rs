//! Delivery of queued work: scheduled messages, scheduled posts and raw
//! messages whose background processing never finished.

use crate::error::KernelResult;
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Duration, Utc};
use pulsecrm_types::content::DeliveryStatus;
use tracing::{info, warn};

/// Raw messages younger than this are left to their ingestion task.
const RAW_RETRY_GRACE_SECS: i64 = 300;
const RAW_RETRY_BATCH: usize = 20;

impl CrmKernel {
    pub async fn dispatch_due(&self) -> KernelResult<JobReport> {
        self.dispatch_due_at(Utc::now()).await
    }

    pub async fn dispatch_due_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("dispatch");

        for message in self.store.due_scheduled_messages(now)? {
            report.examined += 1;
            match self
                .send_text(message.channel, &message.recipient, &message.body)
                .await
            {
                Ok(()) => {
                    self.store
                        .mark_scheduled_message(&message.id, DeliveryStatus::Sent, None)?;
                    report.actions += 1;
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Scheduled message failed");
                    self.store.mark_scheduled_message(
                        &message.id,
                        DeliveryStatus::Failed,
                        Some(&e.to_string()),
                    )?;
                    report.errors += 1;
                }
            }
        }

        for mut content in self.store.due_scheduled_content(now)? {
            report.examined += 1;
            let platform = content.platform;
            let results = self.publish_now(&mut content, &[platform], now).await?;
            if results.iter().any(|r| r.success) {
                report.actions += 1;
            } else {
                report.errors += 1;
            }
        }

        let grace = now - Duration::seconds(RAW_RETRY_GRACE_SECS);
        for raw in self.store.unprocessed_raw_messages(RAW_RETRY_BATCH)? {
            if raw.received_at > grace {
                continue;
            }
            report.examined += 1;
            match self.process_raw_message(&raw.id).await {
                Ok(_) => report.actions += 1,
                Err(e) => {
                    warn!(raw_id = %raw.id, error = %e, "Raw message retry failed");
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                delivered = report.actions,
                errors = report.errors,
                "Dispatch run finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use pulsecrm_types::content::{ContentStatus, GeneratedContent, Platform, ScheduledMessage};
    use pulsecrm_types::conversation::{Channel, RawMessage};
    use pulsecrm_types::new_id;
    use serde_json::json;

    fn queued(kernel: &CrmKernel, send_at: DateTime<Utc>, recipient: &str) -> ScheduledMessage {
        let m = ScheduledMessage {
            id: new_id(),
            lead_id: Some("lead-1".into()),
            customer_id: None,
            channel: Channel::Whatsapp,
            recipient: recipient.into(),
            body: "Tip del día".into(),
            campaign: Some("product_education:2026-10-16".into()),
            send_at,
            status: DeliveryStatus::Pending,
            error: None,
            created_at: Utc::now(),
            sent_at: None,
        };
        kernel.store.insert_scheduled_message(&m).unwrap();
        m
    }

    #[tokio::test]
    async fn sends_only_due_messages_once() {
        let (kernel, sink) = test_kernel(None);
        let due = queued(&kernel, Utc::now() - Duration::minutes(1), "507600");
        queued(&kernel, Utc::now() + Duration::hours(1), "507601");

        let report = kernel.dispatch_due().await.unwrap();
        assert_eq!(report.actions, 1);
        assert_eq!(sink.sent_to("507600").len(), 1);
        assert!(sink.sent_to("507601").is_empty());

        let stored = kernel.store.scheduled_messages_for_lead("lead-1").unwrap();
        let sent = stored.iter().find(|m| m.id == due.id).unwrap();
        assert_eq!(sent.status, DeliveryStatus::Sent);
        assert!(sent.sent_at.is_some());

        assert_eq!(kernel.dispatch_due().await.unwrap().actions, 0);
    }

    #[tokio::test]
    async fn due_content_without_credentials_fails() {
        let (kernel, _) = test_kernel(None);
        let content = GeneratedContent {
            id: new_id(),
            content_type: "post".into(),
            platform: Platform::Instagram,
            topic: "Sofás".into(),
            asset_url: None,
            copy: "Confort".into(),
            hashtags: vec![],
            status: ContentStatus::Scheduled,
            scheduled_for: Some(Utc::now() - Duration::minutes(5)),
            published_at: None,
            external_id: None,
            metrics: json!({}),
            created_at: Utc::now(),
        };
        kernel.store.insert_content(&content).unwrap();

        let report = kernel.dispatch_due().await.unwrap();
        assert_eq!(report.errors, 1);
        let stored = kernel.store.get_content(&content.id).unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::Failed);
    }

    #[tokio::test]
    async fn stale_raw_messages_are_reprocessed() {
        let (kernel, _) = test_kernel(None);
        let mut raw = RawMessage::new(Channel::Whatsapp, "unknown", "", json!({}));
        raw.received_at = Utc::now() - Duration::minutes(10);
        kernel.store.insert_raw_message(&raw).unwrap();
        let fresh = RawMessage::new(Channel::Whatsapp, "unknown", "", json!({}));
        kernel.store.insert_raw_message(&fresh).unwrap();

        let report = kernel.dispatch_due().await.unwrap();
        assert_eq!(report.examined, 1);
        assert!(kernel.store.get_raw_message(&raw.id).unwrap().unwrap().processed);
        assert!(!kernel.store.get_raw_message(&fresh.id).unwrap().unwrap().processed);
    }
}
