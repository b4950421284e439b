use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::{Caller, Role},
    envelope::{ApiError, ApiResult, Envelope},
    store::{model::DEFAULT_RATE, ExportRow, Mutation, NewUser, UserRows, UserSummary, UserUpdate},
    webhooks::{USER_CREATED, USER_DELETED, USER_UPDATED},
    AppState,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Column titles of the CSV export.
pub const CSV_HEADER: [&str; 6] = [
    "Usuario",
    "Contraseña",
    "Upload",
    "Download",
    "Perfil",
    "Fecha Creación",
];

// ── List ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserSummary>,
    pub total: i64,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<UserPage> {
    caller.require(Role::Viewer)?;
    let Query(q) = query?;

    let search = q.search.unwrap_or_default();
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0);
    let offset = q.offset.unwrap_or(0).max(0);

    let users = state.store.list_users(&search, limit, offset).await?;
    let total = state.store.count_users(&search).await?;
    Ok(Envelope::ok("users retrieved", UserPage { users, total }))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub bandwidth_up: Option<String>,
    pub bandwidth_down: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub username: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<Created> {
    caller.require(Role::Operator)?;
    let Json(body) = body?;

    let (Some(username), Some(password)) = (non_empty(body.username), non_empty(body.password))
    else {
        return Err(ApiError::validation("username and password are required"));
    };

    let rate = |r: Option<String>| r.unwrap_or_else(|| DEFAULT_RATE.to_owned());
    let user = NewUser {
        username,
        password,
        bandwidth_up: rate(body.bandwidth_up),
        bandwidth_down: rate(body.bandwidth_down),
        profile: body.profile,
    };

    if !state.store.create_user(&user).await? {
        return Err(ApiError::Conflict("user already exists".into()));
    }

    info!(
        username = %user.username,
        bandwidth_up = %user.bandwidth_up,
        bandwidth_down = %user.bandwidth_down,
        profile = ?user.profile,
        "audit: user.create"
    );
    state.notify(USER_CREATED, json!({ "username": user.username }));

    Ok(Envelope::ok(
        "user created",
        Created {
            username: user.username,
        },
    ))
}

// ── Get ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UsernameParams {
    pub username: Option<String>,
}

/// Raw rows for one user; empty lists if the user does not exist.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<UsernameParams>, QueryRejection>,
) -> ApiResult<UserRows> {
    caller.require(Role::Viewer)?;
    let Query(q) = query?;
    let username = non_empty(q.username).ok_or_else(username_required)?;

    let rows = state.store.user_rows(&username).await?;
    Ok(Envelope::ok("user retrieved", rows))
}

// ── Update ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub bandwidth_up: Option<String>,
    pub bandwidth_down: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    caller.require(Role::Operator)?;
    let Json(body) = body?;
    let username = non_empty(body.username).ok_or_else(username_required)?;

    let update = UserUpdate {
        username,
        password: non_empty(body.password),
        bandwidth_up: body.bandwidth_up,
        bandwidth_down: body.bandwidth_down,
    };

    let outcome = state
        .store
        .update_user(&update, state.strict_not_found)
        .await?;
    if outcome == Mutation::NotFound {
        return Err(ApiError::NotFound("user not found".into()));
    }

    info!(
        username = %update.username,
        password_changed = update.password.is_some(),
        bandwidth_up = ?update.bandwidth_up,
        bandwidth_down = ?update.bandwidth_down,
        "audit: user.update"
    );
    state.notify(USER_UPDATED, json!({ "username": update.username }));

    Ok(Envelope::ok_empty("user updated"))
}

// ── Delete ────────────────────────────────────────────────────────────────────

/// Takes the username from the JSON body, falling back to the query string.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<UsernameParams>, QueryRejection>,
    body: Result<Json<UsernameParams>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    caller.require(Role::Operator)?;
    let from_body = body.ok().and_then(|Json(b)| non_empty(b.username));
    let from_query = query.ok().and_then(|Query(q)| non_empty(q.username));
    let username = from_body.or(from_query).ok_or_else(username_required)?;

    let outcome = state
        .store
        .delete_user(&username, state.strict_not_found)
        .await?;
    if outcome == Mutation::NotFound {
        return Err(ApiError::NotFound("user not found".into()));
    }

    info!(username = %username, "audit: user.delete");
    state.notify(USER_DELETED, json!({ "username": username }));

    Ok(Envelope::ok_empty("user deleted"))
}

// ── Export ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// `format=csv` (the default) downloads a file; anything else returns JSON.
pub async fn export_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    caller.require(Role::Admin)?;
    let Query(q) = query?;
    let format = q.format.unwrap_or_else(|| "csv".to_owned());

    let rows = state.store.export_rows().await?;
    info!(count = rows.len(), %format, "audit: user.export");

    if format != "csv" {
        return Ok(Envelope::ok("users exported", rows).into_response());
    }

    let csv = render_csv(&rows)?;
    let filename = format!(
        "usuarios_radius_{}.csv",
        Local::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        Body::from(csv),
    )
        .into_response())
}

/// CSV with [`CSV_HEADER`]; missing rates and dates become `N/A`, a missing profile `default`.
pub fn render_csv(rows: &[ExportRow]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            row.username.as_str(),
            row.password.as_deref().unwrap_or_default(),
            row.bandwidth_up.as_deref().unwrap_or("N/A"),
            row.bandwidth_down.as_deref().unwrap_or("N/A"),
            row.profile.as_deref().unwrap_or("default"),
            row.creationdate.as_deref().unwrap_or("N/A"),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv export: {}", e.error()))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn username_required() -> ApiError {
    ApiError::validation("username is required")
}
