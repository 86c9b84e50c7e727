//! Lead nurturing campaigns.
//!
//! Awareness-stage leads follow the `cold_to_warm` sequence keyed on days
//! since they entered nurturing; everyone further along gets one
//! `product_education` message per day. Content is queued as a
//! [`ScheduledMessage`] and delivered by the dispatch job.

use crate::error::KernelResult;
use crate::kernel::lead_route;
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Duration, Utc};
use pulsecrm_types::content::{DeliveryStatus, JourneyStage, ScheduledMessage};
use pulsecrm_types::lead::{Lead, LeadStatus};
use pulsecrm_types::new_id;
use tracing::{debug, info, warn};

/// Delay between generating nurturing content and sending it.
const SEND_DELAY_HOURS: i64 = 2;

const COLD_TO_WARM: [(i64, &str); 4] = [
    (0, "Educate without selling: a short tip plus a pointer to a useful resource."),
    (2, "Share a short customer success story relevant to this lead."),
    (4, "Compare the options available to them honestly and briefly."),
    (6, "Present a special offer with a clear call to action."),
];

const PRODUCT_EDUCATION: &str =
    "Explain one product feature or use case that helps this lead decide.";

/// Which campaign step (if any) a lead should receive today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignStep {
    pub campaign: String,
    pub brief: &'static str,
}

/// Pick the campaign step for `lead` as of `now`.
pub fn next_campaign_step(lead: &Lead, now: DateTime<Utc>) -> Option<CampaignStep> {
    match JourneyStage::from_score(lead.score) {
        JourneyStage::Awareness => {
            let started = lead.nurturing_started_at.unwrap_or(now);
            let day = (now - started).num_days();
            COLD_TO_WARM
                .iter()
                .find(|(d, _)| *d == day)
                .map(|(d, brief)| CampaignStep {
                    campaign: format!("cold_to_warm:day{d}"),
                    brief,
                })
        }
        JourneyStage::Consideration | JourneyStage::Decision => Some(CampaignStep {
            campaign: format!("product_education:{}", now.date_naive()),
            brief: PRODUCT_EDUCATION,
        }),
    }
}

impl CrmKernel {
    pub async fn process_nurturing(&self) -> KernelResult<JobReport> {
        self.process_nurturing_at(Utc::now()).await
    }

    /// Queue today's nurturing content for every lead in nurturing.
    pub async fn process_nurturing_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("nurturing");
        for lead in self.store.leads_by_status(LeadStatus::Nurturing)? {
            report.examined += 1;
            match self.nurture(lead, now).await {
                Ok(Some(_)) => report.actions += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Nurturing failed for lead");
                    report.errors += 1;
                }
            }
        }
        info!(
            examined = report.examined,
            scheduled = report.actions,
            "Nurturing run finished"
        );
        Ok(report)
    }

    /// Nurture a single lead now.
    pub async fn nurture_lead(&self, lead_id: &str) -> KernelResult<Option<ScheduledMessage>> {
        let lead = self.lead(lead_id)?;
        self.nurture(lead, Utc::now()).await
    }

    async fn nurture(&self, mut lead: Lead, now: DateTime<Utc>) -> KernelResult<Option<ScheduledMessage>> {
        if lead.nurturing_started_at.is_none() {
            lead.nurturing_started_at = Some(now);
            lead.updated_at = now;
            self.store.update_lead(&lead)?;
        }
        let Some(step) = next_campaign_step(&lead, now) else {
            debug!(lead_id = %lead.id, "No campaign content due today");
            return Ok(None);
        };
        if self.store.campaign_step_queued(&lead.id, &step.campaign)? {
            return Ok(None);
        }
        let Some((channel, recipient)) = lead_route(&lead) else {
            warn!(lead_id = %lead.id, "Lead has no reachable address, skipping nurturing");
            return Ok(None);
        };
        // Without an LLM there is nothing worth sending.
        let Some(ai) = &self.ai else {
            return Ok(None);
        };

        let prompt = format!(
            "Lead name: {}\nCompany: {}\nJourney stage: {}\nBrief: {}",
            lead.name.as_deref().unwrap_or("N/A"),
            lead.company.as_deref().unwrap_or("particular"),
            JourneyStage::from_score(lead.score),
            step.brief,
        );
        let body = ai
            .complete_text(
                "You write short, expert but approachable nurturing messages in Spanish. \
                 Reply with the message text only.",
                &prompt,
                0.7,
                400,
            )
            .await?;
        if body.is_empty() {
            return Ok(None);
        }

        let message = ScheduledMessage {
            id: new_id(),
            lead_id: Some(lead.id.clone()),
            customer_id: None,
            channel,
            recipient,
            body,
            campaign: Some(step.campaign),
            send_at: now + Duration::hours(SEND_DELAY_HOURS),
            status: DeliveryStatus::Pending,
            error: None,
            created_at: now,
            sent_at: None,
        };
        self.store.insert_scheduled_message(&message)?;
        info!(
            lead_id = %lead.id,
            campaign = message.campaign.as_deref().unwrap_or_default(),
            send_at = %message.send_at,
            "Nurturing content scheduled"
        );
        Ok(Some(message))
    }
}
