use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use constant_time_eq::constant_time_eq;
use tracing::debug;

use crate::{envelope::ApiError, store::Store, AppState};

/// Caller privilege. Variants are declared in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::Operator => 2,
            Role::Admin => 3,
        }
    }

    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Only the shared secret is accepted.
    #[default]
    Simple,
    /// The shared secret is admin; other keys resolve through `api_users`.
    Roles,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(AuthMode::Simple),
            "roles" | "role" => Ok(AuthMode::Roles),
            other => Err(format!(
                "unknown auth mode `{other}` (expected simple or roles)"
            )),
        }
    }
}

/// Authenticated caller, stored in request extensions by [`authenticate`].
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub role: Role,
}

impl Caller {
    pub fn require(&self, required: Role) -> Result<(), ApiError> {
        if self.role.satisfies(required) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Resolves bearer tokens to roles.
#[derive(Clone)]
pub struct Gate {
    api_key: Arc<str>,
    mode: AuthMode,
}

impl Gate {
    pub fn new(api_key: impl Into<Arc<str>>, mode: AuthMode) -> Self {
        Self {
            api_key: api_key.into(),
            mode,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn is_shared_secret(&self, token: &str) -> bool {
        constant_time_eq(token.as_bytes(), self.api_key.as_bytes())
    }

    /// `None` means the token is not accepted.
    pub async fn resolve(&self, store: &Store, token: &str) -> Result<Option<Role>, ApiError> {
        if self.is_shared_secret(token) {
            return Ok(Some(Role::Admin));
        }
        match self.mode {
            AuthMode::Simple => Ok(None),
            AuthMode::Roles => {
                let Some(raw) = store.role_for_key(token).await? else {
                    return Ok(None);
                };
                Ok(Some(raw.parse().unwrap_or_else(|e: String| {
                    debug!(error = %e, "unrecognised api_users role, treating as viewer");
                    Role::Viewer
                })))
            }
        }
    }
}

/// Axum middleware that requires `Authorization: Bearer <token>` on every
/// route except `login`, and records the resolved [`Caller`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_login_path(request.uri().path()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };

    match state.gate.resolve(&state.store, token).await {
        Ok(Some(role)) => {
            request.extensions_mut().insert(Caller { role });
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => e.into_response(),
    }
}

/// True when the last non-empty path segment is `login`.
pub fn is_login_path(path: &str) -> bool {
    path.rsplit('/').find(|s| !s.is_empty()) == Some("login")
}
