//! STAGEWISE: startup stage derivation service.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the configured snapshot store and serves the HTTP API until
//! Ctrl+C, then flushes in-memory state to disk if configured.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use stagewise::api::{self, ApiState};
use stagewise::config::{self, StorageBackend};
use stagewise::storage::{InMemoryRepository, SnapshotRepository, SqliteRepository};
use stagewise::validation::FinancialValidator;
use stagewise::workflow::SnapshotService;

/// Env var that forces JSON log output regardless of config.
const LOG_JSON_ENV: &str = "STAGEWISE_LOG_JSON";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load_default()?;
    init_logging(&cfg);

    info!(
        service = %cfg.service.name,
        currency = %cfg.service.currency,
        addr = %cfg.server.addr(),
        "STAGEWISE starting up"
    );

    // -- Storage ---------------------------------------------------------

    let backend = cfg.storage.backend()?;
    let mut memory_store: Option<(Arc<InMemoryRepository>, String)> = None;

    let repo: Arc<dyn SnapshotRepository> = match &backend {
        StorageBackend::Memory { state_file } => {
            let store = match state_file {
                Some(path) => Arc::new(InMemoryRepository::load_from_file(path).await?),
                None => Arc::new(InMemoryRepository::new()),
            };
            if let Some(path) = state_file {
                memory_store = Some((store.clone(), path.clone()));
            } else {
                warn!("In-memory store without state_file: snapshots are lost on shutdown");
            }
            info!(snapshots = store.len().await, "Using in-memory store");
            store as Arc<dyn SnapshotRepository>
        }
        StorageBackend::Sqlite { url } => Arc::new(SqliteRepository::connect(url).await?),
    };

    // -- Service ---------------------------------------------------------

    let validator = FinancialValidator::new(cfg.validation.clone());
    let service = SnapshotService::new(repo, validator);
    let state = Arc::new(ApiState::new(service, cfg.service.name.clone()));

    info!("Serving. Press Ctrl+C to stop.");
    api::serve(state, &cfg.server.addr(), shutdown_signal()).await?;

    // -- Graceful shutdown -----------------------------------------------

    if let Some((store, path)) = memory_store {
        store.save_to_file(&path).await?;
        info!(path = %path, "State saved");
    }
    info!("STAGEWISE shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

/// Resolve once `signal` fires. A listener that fails to install never
/// resolves, so the server keeps running.
async fn wait_for_shutdown(signal: impl std::future::Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "Failed to listen for Ctrl+C; serving until the process is killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter. JSON output is enabled by
/// `logging.json` or by setting `STAGEWISE_LOG_JSON`.
fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));

    let json_logging = cfg.logging.json || std::env::var(LOG_JSON_ENV).is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
