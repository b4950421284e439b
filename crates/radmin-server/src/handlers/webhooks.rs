use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{Caller, Role},
    envelope::{ApiError, ApiResult, Envelope},
    store::{NewWebhook, WebhookSubscription},
    webhooks::validate_webhook_url,
    AppState,
};

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<WebhookSubscription>> {
    caller.require(Role::Admin)?;
    let subs = state.registry.list().await?;
    let message = if subs.is_empty() {
        "no webhooks configured"
    } else {
        "webhooks retrieved"
    };
    Ok(Envelope::ok(message, subs))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateWebhookRequest {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> ApiResult<WebhookSubscription> {
    caller.require(Role::Admin)?;
    let Json(body) = body?;

    let url = body.url.filter(|u| !u.is_empty());
    let events: Vec<String> = body
        .events
        .unwrap_or_default()
        .into_iter()
        .filter(|e| !e.is_empty())
        .collect();
    let Some(url) = url.filter(|_| !events.is_empty()) else {
        return Err(ApiError::validation("url and events are required"));
    };
    validate_webhook_url(&url).map_err(ApiError::Validation)?;

    let sub = state.registry.append(NewWebhook { url, events }).await?;
    info!(id = %sub.id, url = %sub.url, events = ?sub.events, "audit: webhook.create");
    Ok(Envelope::ok("webhook created", sub))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookIdParams {
    pub id: Option<String>,
}

/// Removing an unknown id still succeeds.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<WebhookIdParams>, QueryRejection>,
    body: Result<Json<WebhookIdParams>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    caller.require(Role::Admin)?;
    let from_body = body
        .ok()
        .and_then(|Json(b)| b.id)
        .filter(|id| !id.is_empty());
    let from_query = query
        .ok()
        .and_then(|Query(q)| q.id)
        .filter(|id| !id.is_empty());
    let id = from_body
        .or(from_query)
        .ok_or_else(|| ApiError::validation("id is required"))?;

    let removed = state.registry.remove(&id).await?;
    info!(id = %id, removed, "audit: webhook.delete");
    Ok(Envelope::ok_empty("webhook deleted"))
}
