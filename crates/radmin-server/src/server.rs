use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{authenticate, Gate},
    config::ServerConfig,
    handlers::{
        self,
        accounting::{bandwidth_stats, history},
        users::{create_user, delete_user, export_users, get_user, list_users, update_user},
        webhooks::{create_webhook, delete_webhook, list_webhooks},
    },
    store::{FileRegistry, Store, WebhookRepository},
    webhooks::WebhookDispatcher,
    AppState,
};

pub async fn run(cfg: ServerConfig) -> Result<()> {
    cfg.validate().context("invalid configuration")?;

    let store = Store::connect(&cfg.database)
        .await
        .context("connect to RADIUS database")?;
    info!(db_type = ?store.database_type(), "connected to RADIUS database");

    let registry = FileRegistry::new(&cfg.webhooks.file);
    info!(registry = %registry.path().display(), "using webhook registry");
    let registry: Arc<dyn WebhookRepository> = Arc::new(registry);

    let dispatcher = if cfg.webhooks.enabled {
        Some(WebhookDispatcher::spawn(
            registry.clone(),
            cfg.webhooks.dispatcher_config(),
        )?)
    } else {
        info!("webhook delivery disabled");
        None
    };

    if cfg.mail.user.is_some() {
        info!(host = %cfg.mail.host, port = cfg.mail.port, "mail relay configured");
    }

    let state = AppState {
        store,
        gate: Gate::new(cfg.api_key.as_str(), cfg.auth_mode),
        registry,
        dispatcher,
        strict_not_found: cfg.strict_not_found,
    };
    info!(
        auth_mode = ?cfg.auth_mode,
        strict_not_found = cfg.strict_not_found,
        "authorization configured"
    );

    let app = build_router(
        state,
        cfg.normalized_base_path().as_deref(),
        cfg.cors_origins.as_deref(),
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "radmin server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

/// The full application: API routes at `/` (and under `base_path` when given),
/// the bearer-token gate, CORS and request tracing.
pub fn build_router(
    state: AppState,
    base_path: Option<&str>,
    cors_origins: Option<&str>,
) -> Router {
    let mut api = api_routes();
    if let Some(base) = base_path {
        api = api.nest(base, api_routes());
    }

    let protected = api
        .fallback(handlers::endpoint_not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// One entry per (path, method); a wrong method on a known path answers like
/// an unknown path.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/users", get(list_users).post(create_user))
        .route("/user", get(get_user).put(update_user).delete(delete_user))
        .route("/export", get(export_users))
        .route("/history", get(history))
        .route("/bandwidth-stats", get(bandwidth_stats))
        .route(
            "/webhooks",
            get(list_webhooks)
                .post(create_webhook)
                .delete(delete_webhook),
        )
        .route("/stats", get(handlers::stats))
        .method_not_allowed_fallback(handlers::endpoint_not_found)
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
