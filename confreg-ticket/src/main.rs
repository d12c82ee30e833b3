//! confreg-ticket - Confirmation email and ticket service
//!
//! Receives `{ "registration_id": ... }` from the submission service after a
//! successful primary write, issues the attendee's ticket and emails it.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use confreg_common::config::{load_toml_config, LoggingConfig};
use confreg_common::store::PostgrestClient;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confreg_ticket::config::{TicketConfig, MODULE_NAME};
use confreg_ticket::mailer::Mailer;
use confreg_ticket::{build_router, AppState};

/// Command-line arguments for confreg-ticket
#[derive(Parser, Debug)]
#[command(name = "confreg-ticket")]
#[command(about = "Conference ticket and confirmation email service")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/confreg/confreg-ticket.toml)
    #[arg(short, long, env = "CONFREG_TICKET_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides [server] port)
    #[arg(short, long, env = "CONFREG_TICKET_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: TicketConfig = load_toml_config(MODULE_NAME, args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!(
        "Starting confreg-ticket v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let store_settings = config.store_settings()?;
    let store = PostgrestClient::new(&store_settings).context("Failed to create store client")?;
    info!("Store: {}", store.base_url());

    let mailer = Mailer::new(
        &config.email.api_base,
        config.email_api_key()?,
        config.email.from.clone(),
        confreg_common::time::millis_to_duration(config.email.timeout_ms),
    )
    .context("Failed to create email client")?;

    let state = AppState::new(store, config.store.table.clone(), mailer, config.ticket.clone());
    let app = build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("confreg-ticket listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid [logging] level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
