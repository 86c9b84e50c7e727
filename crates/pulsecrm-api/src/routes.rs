//! Route handlers for the PulseCRM API.
//!
//! Handlers are thin: they extract the request, call one kernel service and
//! map the result onto a status code. Errors are rendered as
//! `{"error": "..."}`.

use crate::types::{
    AcknowledgeBody, AlertQuery, AppState, CloseCaseBody, CustomerQuery, DedupQuery, EscalateBody,
    ListQuery, NurtureQuery, PredictBody, RecoveredQuery, ScheduleBody, VerifyQuery,
};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pulsecrm_channels::webhook::verify_signature;
use pulsecrm_kernel::chatbot::ChatRequest;
use pulsecrm_kernel::classifier::ClassifyRequest;
use pulsecrm_kernel::closer::CloserRequest;
use pulsecrm_kernel::closure::ClosureRequest;
use pulsecrm_kernel::comments::CommentRequest;
use pulsecrm_kernel::content::{GenerateContentRequest, PublishRequest};
use pulsecrm_kernel::ingest::NormalizedMessage;
use pulsecrm_kernel::intent::IntentRequest;
use pulsecrm_kernel::predictor::predict_close;
use pulsecrm_kernel::router::RouteRequest;
use pulsecrm_kernel::sentiment::SentimentRequest;
use pulsecrm_kernel::{KernelError, KernelResult};
use pulsecrm_types::config::resolve_env;
use pulsecrm_types::prediction::PredictionInput;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

fn error_response(e: KernelError) -> Response {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(e, KernelError::AiUnavailable) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        error!(error = %e, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

fn respond<T: Serialize>(result: KernelResult<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Service status
// ---------------------------------------------------------------------------

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "PulseCRM",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "docs": "/api/v1",
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let kernel = &state.kernel;
    let database = kernel.store.list_leads(1).is_ok();
    let status = if database { "healthy" } else { "degraded" };
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "status": status,
            "database": database,
            "ai": kernel.ai.as_ref().map(|a| a.model_name()),
            "n8n": kernel.n8n.is_enabled(),
            "uptime_secs": state.started_at.elapsed().as_secs(),
        })),
    )
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Platform webhook. Answers 200 with a status body unless the signature
/// check fails.
pub async fn webhook_inbound(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kernel = &state.kernel;
    let secret = resolve_env(&kernel.config.meta.app_secret_env).unwrap_or_default();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(&secret, &body, signature) {
        warn!("Webhook signature mismatch");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": "error", "error": "invalid signature"})),
        )
            .into_response();
    }

    let payload = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Webhook body is not JSON");
            return (StatusCode::OK, Json(json!({"status": "error"}))).into_response();
        }
    };
    (StatusCode::OK, Json(kernel.ingest_webhook(payload).await)).into_response()
}

pub async fn webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(q): Query<VerifyQuery>,
) -> Response {
    match state.kernel.verify_webhook(
        q.mode.as_deref(),
        q.verify_token.as_deref(),
        q.challenge.as_deref(),
    ) {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
    }
}

pub async fn webhook_normalized(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<NormalizedMessage>,
) -> Response {
    respond(state.kernel.ingest_normalized(msg).await)
}

// ---------------------------------------------------------------------------
// Leads and message analysis
// ---------------------------------------------------------------------------

pub async fn classify_lead(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(state.kernel.classify_lead(&req).await))
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Response {
    match state.kernel.store.list_leads(q.limit) {
        Ok(leads) => Json(json!({"total": leads.len(), "leads": leads})).into_response(),
        Err(e) => error_response(e.into()),
    }
}

pub async fn get_lead(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let store = &state.kernel.store;
    let result = (|| -> KernelResult<serde_json::Value> {
        let lead = store
            .get_lead(&id)?
            .ok_or_else(|| KernelError::not_found("lead", &id))?;
        let classifications = store.list_classifications(&id)?;
        let conversations = store.conversations_for_lead(&id)?;
        Ok(json!({
            "lead": lead,
            "classifications": classifications,
            "conversations": conversations,
        }))
    })();
    respond(result)
}

pub async fn detect_intent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IntentRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(state.kernel.detect_intent(&req).await))
}

pub async fn analyze_sentiment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SentimentRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(state.kernel.analyze_sentiment(&req).await))
}

pub async fn route_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RouteRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(state.kernel.route(&req)))
}

pub async fn chatbot_respond(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(state.kernel.chatbot_reply(&req).await))
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

pub async fn evaluate_closure(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClosureRequest>,
) -> Response {
    respond(state.kernel.evaluate_closure(&req).await)
}

pub async fn close_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CloseCaseBody>,
) -> Response {
    respond(
        state
            .kernel
            .close_case(&id, &body.reason, body.send_survey)
            .await,
    )
}

pub async fn escalate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EscalateBody>,
) -> Response {
    let kernel = &state.kernel;
    let result = (|| -> KernelResult<serde_json::Value> {
        let reason = match body.reason {
            Some(reason) => Some(reason),
            None => {
                let conversation = kernel
                    .store
                    .get_conversation(&body.conversation_id)?
                    .ok_or_else(|| KernelError::not_found("conversation", &body.conversation_id))?;
                kernel.should_escalate(&conversation, body.message.as_deref().unwrap_or_default())?
            }
        };
        match reason {
            Some(reason) => {
                let case = kernel.escalate(&body.conversation_id, reason)?;
                Ok(json!({"escalated": true, "reason": reason, "case": case}))
            }
            None => Ok(json!({"escalated": false})),
        }
    })();
    respond(result)
}

// ---------------------------------------------------------------------------
// Sales flows
// ---------------------------------------------------------------------------

pub async fn check_follow_ups(State(state): State<Arc<AppState>>) -> Response {
    respond(state.kernel.check_follow_ups().await)
}

pub async fn process_nurturing(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NurtureQuery>,
) -> Response {
    match q.lead_id {
        Some(lead_id) => match state.kernel.nurture_lead(&lead_id).await {
            Ok(queued) => Json(json!({"lead_id": lead_id, "queued": queued})).into_response(),
            Err(e) => error_response(e),
        },
        None => respond(state.kernel.process_nurturing().await),
    }
}

pub async fn sales_close(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CloserRequest>,
) -> Response {
    respond(Ok::<_, KernelError>(
        state.kernel.respond_to_sales_opportunity(&req).await,
    ))
}

pub async fn recover_carts(State(state): State<Arc<AppState>>) -> Response {
    respond(state.kernel.recover_carts().await)
}

pub async fn cart_recovered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<RecoveredQuery>,
) -> Response {
    respond(state.kernel.mark_cart_recovered(&id, q.channel))
}

pub async fn payment_reminders(State(state): State<Arc<AppState>>) -> Response {
    respond(state.kernel.send_payment_reminders().await)
}

// ---------------------------------------------------------------------------
// Content and comments
// ---------------------------------------------------------------------------

pub async fn generate_content(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateContentRequest>,
) -> Response {
    respond(state.kernel.generate_content(&req).await)
}

pub async fn publish_content(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> Response {
    respond(state.kernel.publish_content(&req).await)
}

pub async fn schedule_content(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleBody>,
) -> Response {
    respond(state.kernel.schedule_content(&body.content_id, body.at))
}

pub async fn respond_to_comment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommentRequest>,
) -> Response {
    respond(state.kernel.respond_to_comment(&req).await)
}

// ---------------------------------------------------------------------------
// Data quality
// ---------------------------------------------------------------------------

pub async fn deduplicate(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DedupQuery>,
) -> Response {
    respond(state.kernel.deduplicate(!q.dry_run).await)
}

pub async fn clean_data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CustomerQuery>,
) -> Response {
    match q.customer_id {
        Some(id) => respond(state.kernel.clean_customer(&id)),
        None => respond(state.kernel.clean_all_customers()),
    }
}

pub async fn enrich_data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CustomerQuery>,
) -> Response {
    match q.customer_id {
        Some(id) => respond(state.kernel.enrich_customer(&id).await),
        None => respond(state.kernel.enrich_all_customers().await),
    }
}

pub async fn close_probability(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PredictBody>,
) -> Response {
    if let Some(lead_id) = &body.lead_id {
        return respond(state.kernel.predict_for_lead(lead_id));
    }
    match body.lead_score {
        Some(lead_score) => respond(Ok::<_, KernelError>(predict_close(&PredictionInput {
            lead_score,
            engagement_score: body.engagement_score,
            sentiment_score: body.sentiment_score,
            interaction_count: body.interaction_count,
        }))),
        None => error_response(KernelError::Invalid(
            "either lead_id or lead_score is required".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

pub async fn check_alerts(State(state): State<Arc<AppState>>) -> Response {
    respond(state.kernel.check_all_alerts().await)
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AlertQuery>,
) -> Response {
    match state.kernel.list_alerts(q.status, q.limit) {
        Ok(alerts) => Json(json!({"total": alerts.len(), "alerts": alerts})).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AcknowledgeBody>,
) -> Response {
    respond(state.kernel.acknowledge_alert(&id, &body.by))
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    respond(state.kernel.resolve_alert(&id))
}
