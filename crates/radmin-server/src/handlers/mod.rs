//! HTTP handlers. Each returns an [`Envelope`] or an [`ApiError`], which the
//! envelope module turns into the uniform response body.

pub mod accounting;
pub mod users;
pub mod webhooks;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    auth::{AuthMode, Caller, Role},
    envelope::{ApiError, ApiResult, Envelope},
    store::Stats,
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Login ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// The token handed back is the key itself; no session is minted.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let api_key = body
        .map(|Json(b)| b)
        .unwrap_or_default()
        .api_key
        .unwrap_or_default();
    if api_key.is_empty() {
        return Err(ApiError::InvalidApiKey);
    }

    let role = match state.gate.resolve(&state.store, &api_key).await? {
        Some(role) => role,
        None => {
            info!("audit: login.rejected");
            return Err(ApiError::InvalidApiKey);
        }
    };

    info!(%role, "audit: login");
    let role = (state.gate.mode() == AuthMode::Roles).then_some(role);
    Ok(Envelope::ok(
        "login successful",
        LoginResponse {
            token: api_key,
            role,
        },
    ))
}

// ── Stats ─────────────────────────────────────────────────────────────────────

pub async fn stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Stats> {
    caller.require(Role::Viewer)?;
    let stats = state.store.stats().await?;
    Ok(Envelope::ok("statistics retrieved", stats))
}

// ── Fallback ──────────────────────────────────────────────────────────────────

/// Unknown path or method: a body-level failure, not an HTTP error.
pub async fn endpoint_not_found() -> Envelope<Value> {
    Envelope::failure("endpoint not found")
}
