use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::RngCore;
use tracing_subscriber::EnvFilter;

use radmin_server::store::{schema::create_sqlite_schema, DatabaseConfig, Store};

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "radmind",
    about = "Radmind — FreeRADIUS administration API daemon",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (default: $RADMIN_PORT or 8080)
        #[arg(long, env = "RADMIN_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $RADMIN_HOST or 0.0.0.0)
        #[arg(long, env = "RADMIN_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Log level: error, warn, info, debug, verbose (default: $RADMIN_LOG_LEVEL or warn)
        #[arg(long, env = "RADMIN_LOG_LEVEL")]
        log_level: Option<String>,
    },
    /// Print a fresh random API key
    GenKey,
    /// Create the RADIUS and API-user tables in a SQLite database
    InitDb {
        /// Database URL (default: $RADMIN_DATABASE_URL)
        #[arg(long, env = "RADMIN_DATABASE_URL")]
        database_url: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let raw = match &cli.command {
        Commands::Serve { log_level, .. } => log_level.clone(),
        _ => None,
    }
    .or_else(|| std::env::var("RADMIN_LOG_LEVEL").ok())
    .unwrap_or_else(|| "warn".into());
    let effective_log_level = if raw.eq_ignore_ascii_case("verbose") {
        "debug".to_owned()
    } else {
        raw
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            log_level: _,
        } => cmd_serve(host, port).await,
        Commands::GenKey => cmd_gen_key(),
        Commands::InitDb { database_url } => cmd_init_db(&database_url).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = radmin_server::ServerConfig {
        host,
        port,
        ..radmin_server::ServerConfig::from_env().context("read configuration")?
    };
    radmin_server::run(cfg).await
}

fn cmd_gen_key() -> Result<()> {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    println!("{}", hex::encode(key));
    Ok(())
}

async fn cmd_init_db(database_url: &str) -> Result<()> {
    let store = Store::connect(&DatabaseConfig::new(database_url).max_connections(1))
        .await
        .context("connect to database")?;
    create_sqlite_schema(&store)
        .await
        .context("create schema")?;
    println!("schema ready at {database_url}");
    Ok(())
}
