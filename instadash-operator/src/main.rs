//! instadash-operator: reconciles Dashboard resources with Instana.
//!
//! This daemon:
//! - Serves a REST API where users submit and delete Dashboard resources
//! - Watches the resource store for changes
//! - Creates a custom dashboard in Instana for every new Dashboard
//! - Deletes the Instana dashboard before a Dashboard is removed

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use instadash_operator::rest::{AppState, create_router};
use instadash_operator::{
    ApiCredentials, AuditLogger, ConfigMapFile, Controller, ControllerConfig, CredentialsSource,
    DashboardReconciler, DataStore, InstanaClient, MemoryStore, StaticCredentials,
};

/// instadash Dashboard operator
#[derive(Parser, Debug)]
#[command(name = "instadash-operator", version, about)]
struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "[::]:8080")]
    listen: String,

    /// Instana API base URL (e.g., https://tenant-unit.instana.io)
    #[arg(long)]
    instana_base_url: Option<String>,

    /// Instana API token
    #[arg(long)]
    instana_api_token: Option<String>,

    /// JSON file with instana-base-url and instana-api-token keys, re-read on every reconcile
    #[arg(long, conflicts_with_all = ["instana_base_url", "instana_api_token"])]
    credentials_file: Option<PathBuf>,

    /// Number of reconcile workers
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Timeout for a single Instana or store call, in seconds
    #[arg(long, default_value = "10")]
    call_timeout_secs: u64,

    /// Deadline for a whole reconcile, in seconds
    #[arg(long, default_value = "30")]
    reconcile_timeout_secs: u64,

    /// Requeue every Dashboard at this interval, in seconds (0 disables)
    #[arg(long, default_value = "300")]
    resync_interval_secs: u64,
}

fn credentials_source(args: &Args) -> Result<Arc<dyn CredentialsSource>> {
    if let Some(path) = &args.credentials_file {
        info!("Loading Instana credentials from {}", path.display());
        return Ok(Arc::new(ConfigMapFile::new(path.clone())));
    }

    match (&args.instana_base_url, &args.instana_api_token) {
        (Some(base_url), Some(token)) => {
            info!("Instana base URL: {}", base_url);
            Ok(Arc::new(StaticCredentials::new(ApiCredentials::new(
                base_url.clone(),
                token.clone(),
            ))))
        }
        _ => bail!(
            "either --credentials-file or both --instana-base-url and --instana-api-token are required"
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "instadash_operator=info,audit=info,tower_http=info,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let credentials = credentials_source(&args)?;
    let call_timeout = Duration::from_secs(args.call_timeout_secs.max(1));

    info!("Starting instadash-operator");

    let store = Arc::new(MemoryStore::new());
    let client = InstanaClient::new(call_timeout).context("Failed to build HTTP client")?;
    let audit = AuditLogger::new("operator");

    let reconciler = DashboardReconciler::new(store.clone(), Arc::new(client), credentials)
        .with_call_timeout(call_timeout)
        .with_audit(audit.clone());

    let config = ControllerConfig {
        workers: args.workers.max(1),
        reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs.max(1)),
        resync_interval: (args.resync_interval_secs > 0)
            .then(|| Duration::from_secs(args.resync_interval_secs)),
        ..ControllerConfig::default()
    };
    let store: Arc<dyn DataStore> = store;
    let controller =
        Arc::new(Controller::new(store.clone(), Arc::new(reconciler), config).with_audit(audit));

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut rest_shutdown = shutdown_tx.subscribe();

    let controller_handle = tokio::spawn(controller.run(shutdown_rx));

    let router = create_router(Arc::new(AppState { store }));
    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("REST API listening on {}", args.listen);

    let rest_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                rest_shutdown.changed().await.ok();
            })
            .await
    });

    // Wait for shutdown signal
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);

    match controller_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Controller failed: {}", e),
        Err(e) => error!("Controller task panicked: {}", e),
    }
    if let Ok(Err(e)) = rest_handle.await {
        error!("REST server failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
