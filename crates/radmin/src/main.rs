use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "radmin",
    about = "Radmin — manage FreeRADIUS users through a radmind server",
    version
)]
struct Cli {
    /// Server URL, including any base path (default: $RADMIN_URL)
    #[arg(
        long,
        env = "RADMIN_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    url: String,
    /// API key sent as a bearer token (default: $RADMIN_API_KEY)
    #[arg(long, env = "RADMIN_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
    /// Request timeout, e.g. 30s or 2m
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration, global = true)]
    timeout: Duration,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the API key against the server
    Login,
    /// Show user and active-session counts
    Stats,
    /// List users
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Create a user
    Create {
        username: String,
        password: String,
        /// Upload rate, e.g. 10M
        #[arg(long)]
        up: Option<String>,
        /// Download rate, e.g. 10M
        #[arg(long)]
        down: Option<String>,
        /// Group to place the user in
        #[arg(long)]
        profile: Option<String>,
    },
    /// Show a user's check and reply attributes
    Get { username: String },
    /// Change a user's password or rates
    Update {
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        up: Option<String>,
        #[arg(long)]
        down: Option<String>,
    },
    /// Delete a user
    Delete { username: String },
    /// Export all users
    Export {
        /// csv or json
        #[arg(long, default_value = "csv")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show a user's accounting sessions
    History {
        username: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show per-day traffic totals
    Bandwidth {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        days: Option<i64>,
    },
    /// Manage webhook subscriptions
    Webhooks {
        #[command(subcommand)]
        command: WebhookCommands,
    },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// List subscriptions
    List,
    /// Subscribe a URL to one or more events (user.created, user.updated, user.deleted, *)
    Add {
        url: String,
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Remove a subscription by id
    Remove { id: String },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = std::env::var("RADMIN_LOG_LEVEL").unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();

    let client = ApiClient::new(&cli.url, cli.api_key.clone(), cli.timeout)?;

    match cli.command {
        Commands::Login => {
            let key = cli
                .api_key
                .context("--api-key or RADMIN_API_KEY is required")?;
            let request = client.request(Method::POST, "/login");
            let data = client.send(request.json(&json!({ "api_key": key }))).await?;
            print_data(&data)
        }
        Commands::Stats => client.call(Method::GET, "/stats", None, &[]).await,
        Commands::List {
            search,
            limit,
            offset,
        } => {
            let mut query = Vec::new();
            push_param(&mut query, "search", search);
            push_param(&mut query, "limit", limit);
            push_param(&mut query, "offset", offset);
            client.call(Method::GET, "/users", None, &query).await
        }
        Commands::Create {
            username,
            password,
            up,
            down,
            profile,
        } => {
            let body = json!({
                "username": username,
                "password": password,
                "bandwidth_up": up,
                "bandwidth_down": down,
                "profile": profile,
            });
            client.call(Method::POST, "/users", Some(body), &[]).await
        }
        Commands::Get { username } => {
            let query = [("username", username)];
            client.call(Method::GET, "/user", None, &query).await
        }
        Commands::Update {
            username,
            password,
            up,
            down,
        } => {
            let body = json!({
                "username": username,
                "password": password,
                "bandwidth_up": up,
                "bandwidth_down": down,
            });
            client.call(Method::PUT, "/user", Some(body), &[]).await
        }
        Commands::Delete { username } => {
            let body = json!({ "username": username });
            client.call(Method::DELETE, "/user", Some(body), &[]).await
        }
        Commands::Export { format, output } => client.export(&format, output).await,
        Commands::History { username, limit } => {
            let mut query = vec![("username", username)];
            push_param(&mut query, "limit", limit);
            client.call(Method::GET, "/history", None, &query).await
        }
        Commands::Bandwidth { username, days } => {
            let mut query = Vec::new();
            push_param(&mut query, "username", username);
            push_param(&mut query, "days", days);
            client
                .call(Method::GET, "/bandwidth-stats", None, &query)
                .await
        }
        Commands::Webhooks { command } => match command {
            WebhookCommands::List => client.call(Method::GET, "/webhooks", None, &[]).await,
            WebhookCommands::Add { url, events } => {
                let body = json!({ "url": url, "events": events });
                client
                    .call(Method::POST, "/webhooks", Some(body), &[])
                    .await
            }
            WebhookCommands::Remove { id } => {
                let body = json!({ "id": id });
                client
                    .call(Method::DELETE, "/webhooks", Some(body), &[])
                    .await
            }
        },
    }
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

struct ApiClient {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl ApiClient {
    fn new(base: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base);
        debug!(%method, %url, "request");
        let req = self.http.request(method, url);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&str, String)],
    ) -> Result<()> {
        let mut req = self.request(method, path).query(query);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let data = self.send(req).await?;
        print_data(&data)
    }

    /// Sends the request and unwraps the envelope, failing on `success: false`.
    async fn send(&self, req: RequestBuilder) -> Result<Value> {
        let resp = req.send().await.context("request failed")?;
        let status = resp.status();
        let envelope: Envelope = resp
            .json()
            .await
            .with_context(|| format!("unexpected response (HTTP {status})"))?;
        if !envelope.success {
            bail!("{} (HTTP {status})", envelope.message);
        }
        if !envelope.message.is_empty() {
            eprintln!("{}", envelope.message);
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    async fn export(&self, format: &str, output: Option<PathBuf>) -> Result<()> {
        let req = self
            .request(Method::GET, "/export")
            .query(&[("format", format)]);

        if format != "csv" {
            let data = self.send(req).await?;
            let text = serde_json::to_string_pretty(&data)?;
            return write_output(output, &text);
        }

        let resp = req.send().await.context("request failed")?;
        let is_csv = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/csv"));
        if !is_csv {
            // Errors still come back as a JSON envelope.
            let status = resp.status();
            let envelope: Envelope = resp
                .json()
                .await
                .with_context(|| format!("unexpected response (HTTP {status})"))?;
            bail!("{} (HTTP {status})", envelope.message);
        }
        let text = resp.text().await.context("read export body")?;
        write_output(output, &text)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn push_param<T: ToString>(
    query: &mut Vec<(&'static str, String)>,
    name: &'static str,
    value: Option<T>,
) {
    if let Some(v) = value {
        query.push((name, v.to_string()));
    }
}

fn print_data(data: &Value) -> Result<()> {
    if !data.is_null() {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}

fn write_output(output: Option<PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
