//! roost daemon
//!
//! Operates a fleet of physical devices: per-device workers claim warming
//! tasks from the store, drive reinstall → login → warm sessions against
//! each device's automation agent, and serve the dashboard REST + SSE API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use roost_core::config::Config;
use roost_crypto::CredentialCodec;
use roost_daemon::api::{self, AppState};
use roost_daemon::events::EventSink;
use roost_daemon::scheduler::{ControlOutcome, Scheduler};
use roost_daemon::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "roost-daemon")]
#[command(version, about = "roost daemon - device fleet orchestration")]
struct Args {
    /// Dashboard API bind address
    #[arg(long, default_value = "127.0.0.1:8640", env = "ROOST_API_ADDR")]
    addr: SocketAddr,

    /// Database file path
    #[arg(long, env = "ROOST_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Start with the scheduler idle; the dashboard starts it on demand
    #[arg(long, env = "ROOST_NO_AUTOSTART")]
    no_autostart: bool,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "ROOST_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "ROOST_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("roost_daemon={0},roost_core={0}", args.log_level);
    roost_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting roost-daemon"
    );

    // Missing or malformed master key is fatal before anything else starts
    let config = Config::from_env()?;
    let codec = Arc::new(CredentialCodec::from_base64_key(&config.master_key)?);

    let db_path = match &args.db_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;

    let events = EventSink::new(db.clone());
    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        events.clone(),
        codec,
        config.clone(),
    ));

    if args.no_autostart {
        info!("Scheduler autostart disabled");
    } else {
        match scheduler.start().await? {
            ControlOutcome::Started(0) => warn!("Scheduler running with no devices"),
            ControlOutcome::Started(n) => info!(workers = n, "Scheduler running"),
            _ => {}
        }
    }

    let state = AppState {
        db,
        events,
        scheduler: Arc::clone(&scheduler),
    };
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Dashboard API ready");

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Cooperative shutdown: workers get the stop signal and a grace period
    scheduler.stop().await;

    info!("Daemon stopped");
    Ok(())
}

/// Default database path: ~/.roost/roost.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".roost").join("roost.db"))
}
