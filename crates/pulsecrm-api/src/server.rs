//! Router assembly and the HTTP listener.

use crate::routes;
use crate::types::AppState;
use axum::routing::{get, post};
use axum::Router;
use pulsecrm_kernel::CrmKernel;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full router over a shared kernel.
pub fn build_router(kernel: Arc<CrmKernel>) -> Router {
    let state = Arc::new(AppState::new(kernel));

    let api = Router::new()
        .route("/health", get(routes::health))
        // Webhooks
        .route("/webhooks/inbound", post(routes::webhook_inbound))
        .route("/webhooks/inbound/verify", get(routes::webhook_verify))
        .route("/webhooks/normalized", post(routes::webhook_normalized))
        // Leads and analysis
        .route("/leads/classify", post(routes::classify_lead))
        .route("/leads", get(routes::list_leads))
        .route("/leads/{id}", get(routes::get_lead))
        .route("/intents/detect", post(routes::detect_intent))
        .route("/sentiment/analyze", post(routes::analyze_sentiment))
        .route("/router/route", post(routes::route_message))
        .route("/chatbot/respond", post(routes::chatbot_respond))
        // Cases
        .route("/cases/evaluate-closure", post(routes::evaluate_closure))
        .route("/cases/{id}/close", post(routes::close_case))
        .route("/escalation/escalate", post(routes::escalate))
        // Sales flows
        .route("/followups/check", get(routes::check_follow_ups))
        .route("/nurturing/process", post(routes::process_nurturing))
        .route("/sales/close", post(routes::sales_close))
        .route("/carts/recover", post(routes::recover_carts))
        .route("/carts/{id}/recovered", post(routes::cart_recovered))
        .route("/payments/remind", post(routes::payment_reminders))
        // Content
        .route("/content/generate", post(routes::generate_content))
        .route("/content/publish", post(routes::publish_content))
        .route("/content/schedule", post(routes::schedule_content))
        .route("/comments/respond", post(routes::respond_to_comment))
        // Data quality and predictions
        .route("/data/deduplicate", post(routes::deduplicate))
        .route("/data/clean", post(routes::clean_data))
        .route("/data/enrich", post(routes::enrich_data))
        .route("/predictions/close-probability", post(routes::close_probability))
        // Alerts
        .route("/alerts/check", get(routes::check_alerts))
        .route("/alerts", get(routes::list_alerts))
        .route("/alerts/{id}/acknowledge", post(routes::acknowledge_alert))
        .route("/alerts/{id}/resolve", post(routes::resolve_alert));

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn run_server(
    kernel: Arc<CrmKernel>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(kernel);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "PulseCRM API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
