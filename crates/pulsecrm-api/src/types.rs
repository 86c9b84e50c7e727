//! Shared state and request shapes that exist only at the HTTP layer.

use chrono::{DateTime, Utc};
use pulsecrm_kernel::CrmKernel;
use pulsecrm_types::alert::AlertStatus;
use pulsecrm_types::case::EscalationReason;
use pulsecrm_types::conversation::Channel;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<CrmKernel>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(kernel: Arc<CrmKernel>) -> Self {
        Self {
            kernel,
            started_at: Instant::now(),
        }
    }
}

fn default_limit() -> usize {
    100
}

/// `?limit=` paging for list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Meta's subscription handshake parameters.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

fn default_closure_reason() -> String {
    "resolved".to_string()
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CloseCaseBody {
    #[serde(default = "default_closure_reason")]
    pub reason: String,
    #[serde(default = "yes")]
    pub send_survey: bool,
}

/// Escalate with an explicit reason, or let the triggers decide from
/// `message`.
#[derive(Debug, Deserialize)]
pub struct EscalateBody {
    pub conversation_id: String,
    #[serde(default)]
    pub reason: Option<EscalationReason>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NurtureQuery {
    pub lead_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecoveredQuery {
    pub channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleBody {
    pub content_id: String,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct DedupQuery {
    /// Report groups without merging.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: Option<String>,
}

/// Either a stored lead to derive features from, or the features themselves.
#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub lead_id: Option<String>,
    pub lead_score: Option<f64>,
    #[serde(default)]
    pub engagement_score: f64,
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub interaction_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_acknowledger() -> String {
    "api".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeBody {
    #[serde(default = "default_acknowledger")]
    pub by: String,
}
