//! HTTP server bootstrap

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use jobforge_core::{Config, Executor, JobSystem, Result, ShellExecutor};

use crate::routes::create_router;
use crate::state::AppState;

/// Run the server with the shell executor
pub async fn run(config: Config) -> Result<()> {
    run_with_executor(config, Arc::new(ShellExecutor::new())).await
}

/// Run the server with a custom executor
pub async fn run_with_executor(config: Config, executor: Arc<dyn Executor>) -> Result<()> {
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| jobforge_core::Error::Config(format!("Invalid host: {}", e)))?,
        config.server.port,
    ));

    let system = JobSystem::start(&config, executor);
    let app_state = AppState::new(system.service());
    let app = create_router(app_state);

    info!(
        max_workers = config.worker.max_workers,
        "jobforge API server listening on http://{}", addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    system.shutdown().await;
    Ok(())
}
