use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{Level, info};

use common::repository::Repository;
use executor::WorkerPool;
use executor::runtime::DockerRuntime;

use server::config::AppConfig;
use server::repository::MemoryRepository;
use server::rooms::GlobalRooms;
use server::state::AppState;
use server::{build_router, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let repo = Arc::new(MemoryRepository::new());
    seed::seed_dev_data(&repo);
    let repo: Arc<dyn Repository> = repo;

    let runtime = Arc::new(DockerRuntime::connect().context("Failed to connect to Docker")?);
    let pool = WorkerPool::new(runtime, config.pool.pool_options())
        .await
        .context("Failed to initialize worker pool")?;

    let rooms = Arc::new(GlobalRooms::new(repo.clone(), pool.clone()));

    let state = AppState {
        repo,
        rooms,
        config: config.clone(),
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("server running at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(err = %e, "failed to listen for shutdown signal");
    }
}
