mod auth;
mod fetch;
mod preview;
mod routes;
mod settings;
mod storage;

use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use clap::Parser;
use tandoor::BatchService;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use crate::auth::TokenStore;
use crate::fetch::ImageFetcher;
use crate::preview::PreviewExecutor;
use crate::routes::{AppState, ServerInfo};
use crate::settings::Settings;
use crate::storage::{FsStore, ObjectStore};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    let filter = match settings.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = settings.service_config().context("invalid service configuration")?;
    let executor = PreviewExecutor::new(config.executor.clone(), settings.preview_step());
    let task = config.task;
    let service = Arc::new(BatchService::start(config, executor)?);

    let store = settings
        .storage_dir
        .as_ref()
        .map(|dir| Arc::new(FsStore::new(dir)) as Arc<dyn ObjectStore>);
    let state = AppState {
        batcher: service.clone(),
        auth: Arc::new(TokenStore::new(&settings.username, &settings.password)),
        store,
        fetcher: ImageFetcher::new(FETCH_TIMEOUT)?,
        info: Arc::new(ServerInfo {
            name: settings.project_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            task,
        }),
    };
    let app = routes::router(state, &settings.api_prefix);

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    info!(addr = %settings.bind, prefix = %settings.api_prefix, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    service.shutdown().await;
    info!("stopped");
    Ok(())
}
