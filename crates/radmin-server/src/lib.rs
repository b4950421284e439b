pub mod auth;
pub mod config;
pub mod envelope;
pub mod handlers;
pub mod server;
pub mod store;
pub mod webhooks;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub gate: auth::Gate,
    /// Webhook subscriptions, editable even when delivery is disabled.
    pub registry: Arc<dyn store::WebhookRepository>,
    /// Present only when webhook delivery is enabled.
    pub dispatcher: Option<webhooks::WebhookDispatcher>,
    /// Fail update/delete of a missing user instead of succeeding silently.
    pub strict_not_found: bool,
}

impl AppState {
    /// Queue a lifecycle event if delivery is enabled.
    pub fn notify(&self, event: &str, data: serde_json::Value) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.fire(event, data);
        }
    }
}

pub use config::ServerConfig;
pub use server::{build_router, run};
