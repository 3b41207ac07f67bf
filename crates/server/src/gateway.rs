use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use outreach_core::error::EngineError;
use outreach_orchestration::{CampaignService, CampaignStats, TemplateStats};
use outreach_persistence::PgStore;
use outreach_webhook::WebhookProcessor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

/// Thin HTTP surface over the orchestration contract and webhook ingestion:
/// campaign CRUD/stats, notification list/read, and WhatsApp webhook
/// verify/ingest.
#[derive(Clone)]
struct AppState {
    store: Arc<PgStore>,
    campaigns: Arc<CampaignService>,
    webhook: Arc<WebhookProcessor>,
    webhook_verify_token: String,
    /// If set, mutating endpoints require `Authorization: Bearer <token>`.
    auth_token: Option<String>,
}

pub struct Gateway {
    store: Arc<PgStore>,
    campaigns: Arc<CampaignService>,
    webhook: Arc<WebhookProcessor>,
    webhook_verify_token: String,
    auth_token: Option<String>,
    port: u16,
}

impl Gateway {
    pub fn new(
        store: Arc<PgStore>,
        campaigns: Arc<CampaignService>,
        webhook: Arc<WebhookProcessor>,
        webhook_verify_token: String,
        auth_token: Option<String>,
        port: u16,
    ) -> Self {
        Self {
            store,
            campaigns,
            webhook,
            webhook_verify_token,
            auth_token,
            port,
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let state = AppState {
            store: self.store.clone(),
            campaigns: self.campaigns.clone(),
            webhook: self.webhook.clone(),
            webhook_verify_token: self.webhook_verify_token.clone(),
            auth_token: self.auth_token.clone(),
        };

        let app = Router::new()
            .route("/health", get(health_check))
            .route("/api/status", get(api_status))
            .route("/api/campaigns", post(create_campaign))
            .route("/api/campaigns/:id/stop", post(stop_campaign))
            .route("/api/campaigns/:id/resume", post(resume_campaign))
            .route("/api/campaigns/:id/retry-failed", post(retry_failed))
            .route("/api/campaigns/:id/stats", get(campaign_stats))
            .route("/api/campaigns/:id/template-stats", get(campaign_template_stats))
            .route("/api/campaigns/:id", axum::routing::delete(delete_campaign))
            .route("/api/notifications", get(list_notifications))
            .route("/api/notifications/:id/read", post(mark_notification_read))
            .route("/api/channels/whatsapp/webhook", get(whatsapp_verify))
            .route("/api/channels/whatsapp/webhook", post(whatsapp_webhook))
            .with_state(state);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "outreach-server listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected_token) = &state.auth_token else {
        return Ok(());
    };
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if provided == expected_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn engine_error_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::CampaignNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::CannotDeleteRunning(_) => StatusCode::CONFLICT,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error_response(e: EngineError) -> (StatusCode, Json<Value>) {
    warn!(error = %e, "orchestration request failed");
    (engine_error_status(&e), Json(json!({ "error": e.to_string() })))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
}

async fn api_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize, Default)]
struct CreateCampaignFields {
    sender_id: Option<String>,
    name: Option<String>,
    template_names: Option<String>,
    scheduled_start_time: Option<String>,
}

/// POST /api/campaigns — multipart upload: form fields `sender_id`, `name`,
/// `template_names` (comma-separated, send order), optional
/// `scheduled_start_time` (RFC3339), and a `contacts` file part holding the
/// CSV body.
async fn create_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(code) = check_auth(&state, &headers) {
        return Err((code, Json(json!({ "error": "unauthorized" }))));
    }

    let mut fields = CreateCampaignFields::default();
    let mut csv_bytes: Vec<u8> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?
    {
        match field.name().unwrap_or_default().to_string().as_str() {
            "sender_id" => fields.sender_id = field.text().await.ok(),
            "name" => fields.name = field.text().await.ok(),
            "template_names" => fields.template_names = field.text().await.ok(),
            "scheduled_start_time" => fields.scheduled_start_time = field.text().await.ok(),
            "contacts" => {
                csv_bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?
                    .to_vec()
            }
            _ => {}
        }
    }

    let sender_id: Uuid = fields
        .sender_id
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or((StatusCode::BAD_REQUEST, Json(json!({ "error": "missing or invalid sender_id" }))))?;
    let name = fields
        .name
        .ok_or((StatusCode::BAD_REQUEST, Json(json!({ "error": "missing name" }))))?;
    let template_names: Vec<String> = fields
        .template_names
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let scheduled_start_time: Option<DateTime<Utc>> = fields
        .scheduled_start_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    let campaign = state
        .campaigns
        .create(sender_id, name, template_names, &csv_bytes, scheduled_start_time)
        .await
        .map_err(engine_error_response)?;

    Ok(Json(json!({ "campaign_id": campaign.id, "status": campaign.status })))
}

async fn stop_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers).map_err(|c| (c, Json(json!({ "error": "unauthorized" }))))?;
    state.campaigns.stop(id).await.map_err(engine_error_response)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn resume_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers).map_err(|c| (c, Json(json!({ "error": "unauthorized" }))))?;
    state.campaigns.resume(id).await.map_err(engine_error_response)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn delete_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers).map_err(|c| (c, Json(json!({ "error": "unauthorized" }))))?;
    state.campaigns.delete(id).await.map_err(engine_error_response)?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn retry_failed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&state, &headers).map_err(|c| (c, Json(json!({ "error": "unauthorized" }))))?;
    let retried = state.campaigns.retry_failed(id).await.map_err(engine_error_response)?;
    Ok(Json(json!({ "retried": retried })))
}

async fn campaign_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignStats>, (StatusCode, Json<Value>)> {
    let stats = state.campaigns.stats(id).await.map_err(engine_error_response)?;
    Ok(Json(stats))
}

async fn campaign_template_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TemplateStats>>, (StatusCode, Json<Value>)> {
    let stats = state.campaigns.template_stats(id).await.map_err(engine_error_response)?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
struct NotificationsQuery {
    #[serde(default)]
    unread_only: bool,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Value>, StatusCode> {
    let notifications = state
        .store
        .list_notifications(query.unread_only)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "notifications": notifications })))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    state
        .store
        .mark_notification_read(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode", default)]
    mode: String,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: String,
    #[serde(rename = "hub.challenge", default)]
    challenge: String,
}

/// GET /api/channels/whatsapp/webhook — Meta's subscription-verification
/// handshake.
async fn whatsapp_verify(
    State(state): State<AppState>,
    Query(query): Query<WhatsAppVerifyQuery>,
) -> Result<String, StatusCode> {
    WebhookProcessor::verify_subscription(
        &query.mode,
        &query.verify_token,
        &query.challenge,
        &state.webhook_verify_token,
    )
    .ok_or(StatusCode::UNAUTHORIZED)
}

/// POST /api/channels/whatsapp/webhook — delivery-status and inbound-message
/// ingestion. Acknowledges with 200 immediately and verifies/walks the
/// payload on a background task, so Meta's delivery retries never pile up
/// behind a slow or stalled processing run. A signature mismatch is dropped
/// silently rather than surfaced as a 4xx, since WhatsApp treats any non-200
/// response as a delivery failure and will keep retrying a payload we were
/// never going to accept.
async fn whatsapp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Json<Value> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    tokio::spawn(async move {
        match state.webhook.handle(&body, &signature).await {
            Ok(outcome) => info!(
                status_events_recorded = outcome.status_events_recorded,
                inbound_messages_recorded = outcome.inbound_messages_recorded,
                "webhook payload processed"
            ),
            Err(outreach_webhook::WebhookError::SignatureMismatch) => {
                warn!("webhook signature mismatch, dropping payload");
            }
            Err(e) => warn!(error = %e, "webhook processing failed"),
        }
    });

    Json(json!({ "status": "ok" }))
}

