//! Webhook subscription registry.
//!
//! The registry is always read and written as one collection. The file
//! implementation serialises read-modify-write cycles behind a lock and
//! replaces the file by atomic rename, so concurrent POST/DELETE calls within
//! one process cannot clobber each other.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("failed to replace registry file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("registry task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Storage for webhook subscriptions.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Every subscription, in insertion order. Empty when nothing is stored yet.
    async fn list(&self) -> Result<Vec<WebhookSubscription>>;

    /// Stores a new subscription under a freshly generated unique id.
    async fn append(&self, webhook: NewWebhook) -> Result<WebhookSubscription>;

    /// Removes the subscription with `id`. Returns whether one was removed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

// ── File-backed ──────────────────────────────────────────────────────────────

pub struct FileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<WebhookSubscription>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let subs: Option<Vec<WebhookSubscription>> = serde_json::from_slice(&bytes)?;
        Ok(subs.unwrap_or_default())
    }

    async fn save(&self, subs: Vec<WebhookSubscription>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &subs)).await?
    }
}

#[async_trait]
impl WebhookRepository for FileRegistry {
    async fn list(&self) -> Result<Vec<WebhookSubscription>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn append(&self, webhook: NewWebhook) -> Result<WebhookSubscription> {
        let _guard = self.lock.lock().await;
        let mut subs = self.load().await?;
        let sub = subscription_for(webhook, &subs);
        subs.push(sub.clone());
        self.save(subs).await?;
        Ok(sub)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut subs = self.load().await?;
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        // Rewritten even when nothing matched; the content is unchanged.
        self.save(subs).await?;
        Ok(removed)
    }
}

fn write_atomic(path: &Path, subs: &[WebhookSubscription]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, subs)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRegistry {
    subs: StdMutex<Vec<WebhookSubscription>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_subs<T>(&self, f: impl FnOnce(&mut Vec<WebhookSubscription>) -> T) -> T {
        let mut guard = self.subs.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl WebhookRepository for MemoryRegistry {
    async fn list(&self) -> Result<Vec<WebhookSubscription>> {
        Ok(self.with_subs(|subs| subs.clone()))
    }

    async fn append(&self, webhook: NewWebhook) -> Result<WebhookSubscription> {
        Ok(self.with_subs(|subs| {
            let sub = subscription_for(webhook, subs);
            subs.push(sub.clone());
            sub
        }))
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.with_subs(|subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            subs.len() != before
        }))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn subscription_for(webhook: NewWebhook, existing: &[WebhookSubscription]) -> WebhookSubscription {
    let id = loop {
        let candidate = generate_webhook_id();
        if !existing.iter().any(|s| s.id == candidate) {
            break candidate;
        }
    };
    WebhookSubscription {
        id,
        url: webhook.url,
        events: webhook.events,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Generate a subscription id: 16 random hex chars.
pub fn generate_webhook_id() -> String {
    use rand::Rng;
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}
