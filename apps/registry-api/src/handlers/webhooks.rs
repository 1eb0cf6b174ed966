//! Webhook subscription management. Every route here sits behind the admin
//! gate.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use fwreg_db::{NewWebhook, Webhook};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::{Validate, ValidationError, ValidationErrors};

/// Body for create and update.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebhookRequest {
    #[serde(default)]
    #[validate(url, custom(function = "http_url"))]
    pub url: String,
    #[serde(default)]
    #[validate(length(min = 1, code = "required"), custom(function = "has_event"))]
    pub events: Vec<String>,
    /// Ignored on create. On update, absent means enabled.
    pub enabled: Option<bool>,
}

fn http_url(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    match url::Url::parse(value.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("http_url")),
    }
}

fn has_event(events: &[String]) -> Result<(), ValidationError> {
    if events.iter().all(|e| e.trim().is_empty()) {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

/// Client-facing message for a failed validation. Missing fields win over a
/// malformed URL.
fn validation_message(errors: &ValidationErrors) -> &'static str {
    let missing = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .any(|e| e.code == "required");
    if missing {
        "url/events required"
    } else {
        "url must be an absolute http(s) URL"
    }
}

impl WebhookRequest {
    fn from_payload(payload: Result<Json<Self>, JsonRejection>) -> ApiResult<Self> {
        let Json(request) = payload.map_err(|e| {
            tracing::debug!(error = %e, "Rejected webhook body");
            ApiError::BadRequest("bad json".into())
        })?;

        request.validate().map_err(|e| {
            tracing::debug!(error = %e, "Webhook request failed validation");
            ApiError::BadRequest(validation_message(&e).into())
        })?;
        Ok(request)
    }

    fn into_new(self, enabled: bool) -> NewWebhook {
        NewWebhook {
            url: self.url.trim().to_string(),
            events: self
                .events
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            enabled,
        }
    }
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest("invalid id".into())),
    }
}

/// GET /api/webhooks
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Webhook>>> {
    Ok(Json(Webhook::list(state.db.inner()).await?))
}

/// POST /api/webhooks
///
/// New subscriptions always start enabled.
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = WebhookRequest::from_payload(payload)?;
    let data = request.into_new(true);
    let id = Webhook::create(state.db.inner(), &data).await?;

    tracing::info!(webhook_id = id, url = %data.url, events = ?data.events, "Webhook created");
    Ok(Json(json!({ "id": id })))
}

/// PUT /api/webhooks/{id}
///
/// Replaces url, events and enabled.
pub async fn update(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&raw_id)?;
    let request = WebhookRequest::from_payload(payload)?;
    let enabled = request.enabled.unwrap_or(true);
    let data = request.into_new(enabled);

    if !Webhook::update(state.db.inner(), id, &data).await? {
        return Err(ApiError::NotFound("webhook not found".into()));
    }

    tracing::info!(webhook_id = id, enabled, "Webhook updated");
    Ok(Json(json!({ "updated": true })))
}

/// DELETE /api/webhooks/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&raw_id)?;
    if !Webhook::delete(state.db.inner(), id).await? {
        return Err(ApiError::NotFound("webhook not found".into()));
    }

    tracing::info!(webhook_id = id, "Webhook deleted");
    Ok(Json(json!({ "deleted": true })))
}
