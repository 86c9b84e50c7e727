//! Follow-up sequence for silent leads.

use crate::error::KernelResult;
use crate::kernel::lead_route;
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Duration, Utc};
use pulsecrm_types::lead::{Lead, LeadStatus};
use tracing::{info, warn};

/// One step of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpStage {
    /// Follow-ups the lead must already have received.
    pub sent_before: u32,
    /// Hours of silence before this step fires.
    pub silent_hours: i64,
    pub goal: &'static str,
    fallback: &'static str,
}

pub const FOLLOW_UP_STAGES: [FollowUpStage; 3] = [
    FollowUpStage {
        sent_before: 0,
        silent_hours: 24,
        goal: "Add value: reference their original question, share one useful tip \
               or customer story, end with an open question. Helpful, not salesy.",
        fallback: "¡Hola! Queríamos saber si pudiste revisar la información que te compartimos. \
                   ¿Tienes alguna pregunta en la que podamos ayudarte?",
    },
    FollowUpStage {
        sent_before: 1,
        silent_hours: 96,
        goal: "Gentle urgency: remind them of their interest, mention a time-limited \
               incentive and make replying effortless.",
        fallback: "Te recordamos que tu consulta sigue abierta. Esta semana tenemos condiciones \
                   especiales; responde a este mensaje y te ayudamos a aprovecharlas.",
    },
    FollowUpStage {
        sent_before: 2,
        silent_hours: 168,
        goal: "Last chance: acknowledge there was no reply, offer a final opportunity, \
               let them opt out politely and leave the door open.",
        fallback: "No queremos insistir. Si más adelante necesitas algo, aquí estaremos. \
                   Si prefieres no recibir más mensajes, solo dinos.",
    },
];

const ELIGIBLE: [LeadStatus; 2] = [LeadStatus::New, LeadStatus::Qualified];

impl CrmKernel {
    pub async fn check_follow_ups(&self) -> KernelResult<JobReport> {
        self.check_follow_ups_at(Utc::now()).await
    }

    /// Send the next follow-up to every lead that has been silent long
    /// enough. Leads that finish the sequence move to nurturing.
    pub async fn check_follow_ups_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("follow_up");
        // Latest stage first so a lead advanced in this run is not picked
        // up again by the next stage.
        for (idx, stage) in FOLLOW_UP_STAGES.iter().enumerate().rev() {
            let cutoff = now - Duration::hours(stage.silent_hours);
            let leads = self.store.silent_leads(&ELIGIBLE, stage.sent_before, cutoff)?;
            for lead in leads {
                report.examined += 1;
                let is_last = idx + 1 == FOLLOW_UP_STAGES.len();
                match self.send_follow_up(lead, stage, is_last, now).await {
                    Ok(true) => report.actions += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(stage = idx + 1, error = %e, "Follow-up failed");
                        report.errors += 1;
                    }
                }
            }
        }
        info!(
            examined = report.examined,
            sent = report.actions,
            errors = report.errors,
            "Follow-up check finished"
        );
        Ok(report)
    }

    async fn send_follow_up(
        &self,
        mut lead: Lead,
        stage: &FollowUpStage,
        is_last: bool,
        now: DateTime<Utc>,
    ) -> KernelResult<bool> {
        let Some((channel, recipient)) = lead_route(&lead) else {
            warn!(lead_id = %lead.id, "Lead has no reachable address, skipping follow-up");
            return Ok(false);
        };
        let text = self.follow_up_text(&lead, stage).await;
        self.send_text(channel, &recipient, &text).await?;

        lead.follow_up_count += 1;
        lead.updated_at = now;
        if is_last {
            lead.status = LeadStatus::Nurturing;
            lead.nurturing_started_at = Some(now);
        }
        self.store.update_lead(&lead)?;
        info!(
            lead_id = %lead.id,
            follow_up = lead.follow_up_count,
            channel = %channel,
            "Follow-up sent"
        );
        Ok(true)
    }

    async fn follow_up_text(&self, lead: &Lead, stage: &FollowUpStage) -> String {
        let Some(ai) = &self.ai else {
            return stage.fallback.to_string();
        };
        let prompt = format!(
            "Lead name: {}\nCompany: {}\nFollow-up #{}\nGoal: {}",
            lead.name.as_deref().unwrap_or("N/A"),
            lead.company.as_deref().unwrap_or("N/A"),
            stage.sent_before + 1,
            stage.goal,
        );
        match ai
            .complete_text(
                "You write short sales follow-up messages in Spanish for a retail business. \
                 Reply with the message text only.",
                &prompt,
                0.7,
                300,
            )
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => stage.fallback.to_string(),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Follow-up generation failed, using template");
                stage.fallback.to_string()
            }
        }
    }
}
