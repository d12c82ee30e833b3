//! confreg-submit - Registration submission service
//!
//! Serves the registration API the form page posts to, and exposes the same
//! pipeline on the command line:
//!
//! ```bash
//! confreg-submit serve [--port 5780]
//! confreg-submit submit --form registration.json
//! confreg-submit resync
//! confreg-submit pending
//! confreg-submit diagnose
//! confreg-submit init-config [--output FILE] [--force]
//! ```

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use confreg_common::config::{
    ensure_directory_exists, load_toml_config, LoggingConfig, RootFolderResolver,
};
use confreg_common::RegistrationForm;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confreg_submit::bootstrap::build_services;
use confreg_submit::config::{SubmitConfig, MODULE_NAME};
use confreg_submit::queue_store::{FileQueueStore, MemoryQueueStore, QueueStore};
use confreg_submit::{build_router, AppState};

/// Command-line arguments for confreg-submit
#[derive(Parser, Debug)]
#[command(name = "confreg-submit")]
#[command(about = "Conference registration submission service")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/confreg/confreg-submit.toml)
    #[arg(short, long, global = true, env = "CONFREG_SUBMIT_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the pending registration queue
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Keep queued registrations in memory only
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(short, long, env = "CONFREG_SUBMIT_PORT")]
        port: Option<u16>,
    },
    /// Submit one registration form read from a JSON file
    Submit {
        #[arg(long, value_name = "FILE")]
        form: PathBuf,
    },
    /// Deliver queued registrations to the primary store
    Resync,
    /// List queued registrations
    Pending,
    /// Run network diagnostics against the primary store
    Diagnose,
    /// Write the effective configuration to a TOML file
    InitConfig {
        /// Target file (default: ~/.config/confreg/confreg-submit.toml)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: SubmitConfig = load_toml_config(MODULE_NAME, args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    // Build identification first, before any network activity
    info!(
        "Starting confreg-submit v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Needs no store credentials, so it runs before the pipeline is built
    if let Command::InitConfig { output, force } = &args.command {
        let path = config
            .write_file(output.as_deref(), *force)
            .context("Failed to write configuration")?;
        info!("Configuration written to {}", path.display());
        println!("{}", path.display());
        return Ok(());
    }

    let queue = open_queue(&args, &config)?;
    let services = build_services(&config, queue).context("Failed to configure pipeline")?;

    match args.command {
        Command::Serve { port } => {
            let state = AppState::new(
                services.pipeline,
                services.diagnostics,
                config.phone_requirement,
            );
            let port = port.unwrap_or(config.server.port);
            serve(state, &config.server.host, port).await?;
        }
        Command::Submit { form } => {
            let content = std::fs::read_to_string(&form)
                .with_context(|| format!("Failed to read {}", form.display()))?;
            let form: RegistrationForm =
                serde_json::from_str(&content).context("Form file is not valid JSON")?;

            let record = match form.validate(config.phone_requirement) {
                Ok(record) => record,
                Err(errors) => {
                    for field in errors.fields() {
                        warn!(field, "{}", errors.get(field).unwrap_or_default());
                    }
                    anyhow::bail!("Registration form rejected: {}", errors);
                }
            };

            let outcome = services.pipeline.submit(record).await;
            // The process exits next, which would cancel the email trigger
            services
                .pipeline
                .wait_for_notifications(Duration::from_millis(config.primary.request_timeout_ms))
                .await;
            println!("{}", outcome.user_message());
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Resync => {
            let summary = services.pipeline.resync().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Pending => {
            let pending = services.pipeline.queue().list_pending().await;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        Command::Diagnose => {
            let report = services.diagnostics.run().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},tower_http=debug", logging.level)))
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

fn open_queue(args: &Args, config: &SubmitConfig) -> Result<Arc<dyn QueueStore>> {
    if args.no_persist {
        info!("Queue persistence disabled, pending registrations live in memory");
        return Ok(Arc::new(MemoryQueueStore::new()));
    }

    let resolver = RootFolderResolver::new(MODULE_NAME);
    let root_folder = resolver.resolve(args.root_folder.as_deref(), config.root_folder.as_deref());
    ensure_directory_exists(&root_folder)
        .with_context(|| format!("Failed to initialize root folder {}", root_folder.display()))?;

    let store = FileQueueStore::new(&root_folder);
    info!("Pending queue: {}", store.path().display());
    Ok(Arc::new(store))
}

async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("confreg-submit listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
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
