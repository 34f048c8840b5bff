//! Call-session coordinator server binary

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dialer_engine::gateway::StaticTokenVerifier;
use dialer_engine::{CoordinatorConfig, CoordinatorServer};

#[derive(Parser, Debug)]
#[command(name = "dialerd", about = "Real-time call-session coordinator")]
struct Args {
    /// Address to bind the WebSocket endpoint to
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// SQLite database path for call records; omit for in-memory
    #[arg(long)]
    database: Option<String>,

    /// JSON file mapping connection tokens to identities
    #[arg(long)]
    tokens: Option<String>,

    /// Dial-to-ringing delay in milliseconds
    #[arg(long, default_value_t = 2000)]
    ring_delay_ms: u64,

    /// Stale-session sweep interval in seconds
    #[arg(long, default_value_t = 60)]
    reaper_interval_secs: u64,

    /// Maximum session lifetime in seconds
    #[arg(long, default_value_t = 4 * 3600)]
    max_session_age_secs: u64,

    /// Log filter, e.g. "info" or "dialer_engine=debug"
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .init();

    let mut config = CoordinatorConfig::default();
    config.general.bind_addr = args.bind;
    config.timers.ringing_delay = Duration::from_millis(args.ring_delay_ms);
    config.timers.reaper_interval = Duration::from_secs(args.reaper_interval_secs);
    config.timers.max_session_age = Duration::from_secs(args.max_session_age_secs);

    let verifier = match &args.tokens {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading token file {}", path))?;
            StaticTokenVerifier::from_json(&json).context("parsing token file")?
        }
        None => {
            tracing::warn!("No token file given; every connection will be refused");
            StaticTokenVerifier::new()
        }
    };

    let mut builder = CoordinatorServer::builder()
        .with_config(config)
        .with_verifier(Arc::new(verifier));
    builder = match &args.database {
        Some(path) => builder.with_database_path(path.clone()),
        None => builder.with_in_memory_database(),
    };

    let server = builder.build().await.context("building coordinator")?;
    server.serve().await.context("serving")?;
    Ok(())
}
