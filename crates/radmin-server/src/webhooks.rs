use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use crate::store::{WebhookRepository, WebhookSubscription};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Radmin-Signature";

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

// ── Data types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-delivery timeout.
    pub timeout: Duration,
    /// Events waiting for the worker; further events are dropped.
    pub queue_capacity: usize,
    /// Deliveries in flight at once.
    pub max_in_flight: usize,
    pub signing_secret: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            queue_capacity: 256,
            max_in_flight: 8,
            signing_secret: None,
        }
    }
}

// ── URL validation ───────────────────────────────────────────────────────────

/// Checks that a subscription URL is an absolute `http`/`https` URL with a host.
pub fn validate_webhook_url(url: &str) -> Result<(), String> {
    let uri: http::Uri = url
        .parse()
        .map_err(|_| "url is not a valid URL".to_string())?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err("url must use http:// or https://".to_string()),
    }

    match uri.host() {
        Some(h) if !h.is_empty() => Ok(()),
        _ => Err("url is missing a host".to_string()),
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Handle for queueing lifecycle events. Cheap to clone.
///
/// Events go through a bounded channel to a background worker, which fans
/// each one out to the matching subscriptions. Nothing is reported back.
#[derive(Clone)]
pub struct WebhookDispatcher {
    sender: mpsc::Sender<WebhookEvent>,
}

impl WebhookDispatcher {
    /// Starts the delivery worker. Must be called inside a Tokio runtime.
    pub fn spawn(
        registry: Arc<dyn WebhookRepository>,
        config: DispatcherConfig,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build webhook http client")?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Worker {
            client,
            registry,
            signing_secret: config.signing_secret.map(Arc::from),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        };
        tokio::spawn(worker.run(rx));

        Ok(Self { sender: tx })
    }

    /// Queue `event` for delivery. Never blocks; drops the event if the queue is full.
    pub fn fire(&self, event: &str, data: serde_json::Value) {
        let event = WebhookEvent {
            event: event.to_owned(),
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        };
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(event = %ev.event, "webhook queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                warn!(event = %ev.event, "webhook worker stopped, dropping event");
            }
        }
    }
}

struct Worker {
    client: reqwest::Client,
    registry: Arc<dyn WebhookRepository>,
    signing_secret: Option<Arc<str>>,
    permits: Arc<Semaphore>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<WebhookEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(event).await;
        }
        debug!("webhook worker exiting");
    }

    async fn dispatch(&self, event: WebhookEvent) {
        let registrations = match self.registry.list().await {
            Ok(regs) => regs,
            Err(e) => {
                warn!(error = %e, "failed to list webhooks for delivery");
                return;
            }
        };

        let targets: Vec<WebhookSubscription> = registrations
            .into_iter()
            .filter(|reg| matches_event(&reg.events, &event.event))
            .collect();
        if targets.is_empty() {
            return;
        }

        let body = match serde_json::to_string(&event) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialize webhook event");
                return;
            }
        };
        let signature = self
            .signing_secret
            .as_deref()
            .map(|secret| compute_signature(secret, &body));

        for reg in targets {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };
            let client = self.client.clone();
            let body = body.clone();
            let signature = signature.clone();
            tokio::spawn(async move {
                deliver(&client, &reg.url, body, signature.as_deref()).await;
                drop(permit);
            });
        }
    }
}

/// POST the event body to `url`. Failures are logged and otherwise ignored.
async fn deliver(client: &reqwest::Client, url: &str, body: String, signature: Option<&str>) {
    let mut request = client
        .post(url)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(sig) = signature {
        request = request.header(SIGNATURE_HEADER, format!("sha256={sig}"));
    }

    match request.send().await {
        Ok(resp) => {
            debug!(url, status = %resp.status(), "webhook delivered");
        }
        Err(e) => {
            warn!(url, error = %e, "webhook delivery failed");
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn matches_event(subscribed: &[String], event_type: &str) -> bool {
    subscribed.iter().any(|e| e == "*" || e == event_type)
}

/// Compute HMAC-SHA256 hex digest.
pub fn compute_signature(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_webhook_url("https://hooks.example.com/events").is_ok());
        assert!(validate_webhook_url("http://10.0.0.5:8080/hook").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        let err = validate_webhook_url("ftp://hooks.example.com/events").unwrap_err();
        assert!(err.contains("http"), "{err}");
    }

    #[test]
    fn rejects_relative_and_garbage() {
        assert!(validate_webhook_url("/just/a/path").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let sig1 = compute_signature("my-secret", r#"{"event":"test"}"#);
        let sig2 = compute_signature("my-secret", r#"{"event":"test"}"#);
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let sig1 = compute_signature("secret-a", "body");
        let sig2 = compute_signature("secret-b", "body");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn matches_event_wildcard() {
        let events = vec!["*".to_string()];
        assert!(matches_event(&events, USER_CREATED));
        assert!(matches_event(&events, USER_DELETED));
    }

    #[test]
    fn matches_event_specific() {
        let events = vec![USER_CREATED.to_string(), USER_DELETED.to_string()];
        assert!(matches_event(&events, USER_CREATED));
        assert!(matches_event(&events, USER_DELETED));
        assert!(!matches_event(&events, USER_UPDATED));
    }

    #[test]
    fn event_payload_shape() {
        let ev = WebhookEvent {
            event: USER_CREATED.into(),
            data: serde_json::json!({"username": "alice"}),
            timestamp: "2024-05-01T10:00:00+00:00".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "user.created");
        assert_eq!(v["data"]["username"], "alice");
        assert!(v["timestamp"].is_string());
    }
}
